use std::time::Duration;

use alloy_primitives::U256;
use rand::Rng;

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Calculate exponential backoff with jitter
pub fn calculate_backoff_with_jitter(
    attempt: usize,
    base_delay_ms: u64,
    max_delay_ms: u64,
) -> Duration {
    // delay = base * 2^attempt
    let exponential_delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt.min(32) as u32));

    let capped_delay = exponential_delay.min(max_delay_ms);

    // ±25% jitter, never above the cap
    let mut rng = rand::rng();
    let jitter_range = (capped_delay as f64 * 0.25) as u64;
    let jitter = rng.random_range(0..=jitter_range * 2);
    let final_delay = capped_delay.saturating_add(jitter).saturating_sub(jitter_range).min(max_delay_ms);

    Duration::from_millis(final_delay)
}

/// Check if an error message indicates a rate limit or timeout that should be retried
pub fn is_retryable_error(error_msg: &str) -> bool {
    let error_msg = error_msg.to_lowercase();
    error_msg.contains("429") // Rate limit
        || error_msg.contains("timed out")
        || error_msg.contains("timeout")
        || error_msg.contains("connection reset")
        || error_msg.contains("connection refused")
        || error_msg.contains("too many requests")
        || error_msg.contains("header not found")
}

/// Format base units as a decimal string with `decimals` fractional digits, trimming zeros.
pub fn format_units(
    amount: U256,
    decimals: u32,
) -> String {
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / unit;
    let frac = amount % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Decimal-string serde for U256, used by config and persisted JSON.
pub mod serde_u256 {
    use alloy_primitives::U256;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &U256,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_u256(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse_u256(raw: &str) -> Result<U256, String> {
        let raw = raw.trim().replace('_', "");
        match raw.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16),
            None => U256::from_str_radix(&raw, 10),
        }
        .map_err(|e| format!("invalid uint256 {}: {}", raw, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_respects_cap() {
        for attempt in 0..40 {
            let delay = calculate_backoff_with_jitter(attempt, 500, 30_000);
            assert!(delay <= Duration::from_millis(30_000));
        }
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = calculate_backoff_with_jitter(0, 1_000, 1_000_000);
        let fifth = calculate_backoff_with_jitter(5, 1_000, 1_000_000);
        assert!(first <= Duration::from_millis(1_250));
        assert!(fifth >= Duration::from_millis(24_000));
    }

    #[test]
    fn retryable_messages() {
        assert!(is_retryable_error("HTTP 429 Too Many Requests"));
        assert!(is_retryable_error("operation timed out"));
        assert!(!is_retryable_error("execution reverted"));
    }

    #[test]
    fn formats_units() {
        assert_eq!(format_units(U256::from(1_500_000_000_000_000_000u128), 18), "1.5");
        assert_eq!(format_units(U256::from(2_000_000u64), 6), "2");
        assert_eq!(format_units(U256::from(42u64), 18), "0.000000000000000042");
    }

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(serde_u256::parse_u256("1_000").unwrap(), U256::from(1000u64));
        assert_eq!(serde_u256::parse_u256("0xff").unwrap(), U256::from(255u64));
        assert!(serde_u256::parse_u256("12a").is_err());
    }
}

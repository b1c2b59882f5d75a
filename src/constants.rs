/// ======================= Units =======================
/// One whole token / one whole base coin in base units (18 decimals).
pub const WAD: u128 = 1_000_000_000_000_000_000;
pub const BPS_DENOMINATOR: u16 = 10_000;

/// ======================= Curve defaults =======================
/// Fixed total supply minted per content token; market cap is quoted against it.
pub const DEFAULT_TOTAL_SUPPLY: u128 = 1_000_000_000 * WAD;
/// Tokens that can be issued through the curve before it is exhausted.
pub const DEFAULT_CURVE_SUPPLY_CAP: u128 = 793_100_000 * WAD;
pub const DEFAULT_VIRTUAL_TOKEN_RESERVE: u128 = 1_073_000_000 * WAD;
/// 1.5 base coins of virtual liquidity.
pub const DEFAULT_VIRTUAL_BASE_RESERVE: u128 = 1_500_000_000_000_000_000;
pub const DEFAULT_FEE_BPS: u16 = 100;
pub const DEFAULT_SLIPPAGE_BPS: u16 = 100;

/// ======================= Redis channels / keys =======================
pub const TRADE_EVENT_CHANNEL: &str = "trade_event_created";
pub const DEPLOY_REQUEST_CHANNEL: &str = "curve_deploy_requested";
pub const DEPLOY_RESULT_CHANNEL: &str = "curve_deploy_completed";
pub const INGESTER_HEALTH_KEY_PREFIX: &str = "ingester_health";

/// ======================= Ingester =======================
pub const DEFAULT_INGESTER_ID: &str = "main";

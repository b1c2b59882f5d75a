use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::BPS_DENOMINATOR;
use crate::constants::DEFAULT_CURVE_SUPPLY_CAP;
use crate::constants::DEFAULT_FEE_BPS;
use crate::constants::DEFAULT_TOTAL_SUPPLY;
use crate::constants::DEFAULT_VIRTUAL_BASE_RESERVE;
use crate::constants::DEFAULT_VIRTUAL_TOKEN_RESERVE;
use crate::error::ConfigError;
use crate::model::curve::CurveParams;
use crate::utils::serde_u256;

/// Curve shape used for new deployments and for the bootstrap quote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    #[serde(with = "serde_u256")]
    pub virtual_base_reserve: U256,
    #[serde(with = "serde_u256")]
    pub virtual_token_reserve: U256,
    #[serde(with = "serde_u256")]
    pub curve_supply_cap: U256,
    #[serde(with = "serde_u256")]
    pub total_supply: U256,
    pub fee_bps: u16,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            virtual_base_reserve: U256::from(DEFAULT_VIRTUAL_BASE_RESERVE),
            virtual_token_reserve: U256::from(DEFAULT_VIRTUAL_TOKEN_RESERVE),
            curve_supply_cap: U256::from(DEFAULT_CURVE_SUPPLY_CAP),
            total_supply: U256::from(DEFAULT_TOTAL_SUPPLY),
            fee_bps: DEFAULT_FEE_BPS,
        }
    }
}

impl CurveConfig {
    pub fn params(&self) -> CurveParams {
        CurveParams {
            virtual_base_reserve: self.virtual_base_reserve,
            virtual_token_reserve: self.virtual_token_reserve,
            curve_supply_cap: self.curve_supply_cap,
            total_supply: self.total_supply,
            fee_bps: self.fee_bps,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_bps >= BPS_DENOMINATOR {
            return Err(ConfigError::InvalidSetting {
                name: "curve.fee_bps",
                reason: format!("{} must be below {}", self.fee_bps, BPS_DENOMINATOR),
            });
        }
        self.params().validate().map_err(|e| ConfigError::InvalidSetting {
            name: "curve",
            reason: e.to_string(),
        })
    }
}

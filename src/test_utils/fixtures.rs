use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use alloy_sol_types::SolEvent;

use crate::config::CurveConfig;
use crate::model::CurveParams;
use crate::model::CurveState;
use crate::rpc::abi::IBondingCurve;
use crate::rpc::abi::IContentToken;
use crate::rpc::ChainLog;

/// Test fixtures for creating consistent test data
pub struct TestFixtures;

impl TestFixtures {
    pub fn token() -> Address {
        Address::repeat_byte(0x11)
    }

    pub fn curve() -> Address {
        Address::repeat_byte(0x22)
    }

    pub fn trader() -> Address {
        Address::repeat_byte(0x33)
    }

    pub fn creator() -> Address {
        Address::repeat_byte(0x44)
    }

    pub fn platform() -> Address {
        Address::repeat_byte(0x55)
    }

    pub fn factory() -> Address {
        Address::repeat_byte(0x66)
    }

    pub fn deployer() -> Address {
        Address::repeat_byte(0x77)
    }

    pub fn curve_params() -> CurveParams {
        CurveConfig::default().params()
    }

    /// Freshly deployed curve for `token()` at block 1, nothing sold.
    pub fn curve_state() -> CurveState {
        CurveState::new_deployed(
            Self::token(),
            Self::creator(),
            Self::platform(),
            Self::curve(),
            Self::curve_params(),
            1,
            1_700_000_000,
        )
    }

    /// Transaction hash unique per (block, log index).
    pub fn tx_hash(
        block_number: u64,
        log_index: u64,
    ) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&block_number.to_be_bytes());
        bytes[8..16].copy_from_slice(&log_index.to_be_bytes());
        B256::from(bytes)
    }

    fn log(
        address: Address,
        data: alloy_primitives::LogData,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        ChainLog {
            address,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number,
            transaction_hash: Self::tx_hash(block_number, log_index),
            log_index,
            removed: false,
        }
    }

    pub fn buy_log(
        base_amount: U256,
        token_amount: U256,
        fee: U256,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::Buy {
            token: Self::token(),
            buyer: Self::trader(),
            baseAmount: base_amount,
            tokenAmount: token_amount,
            fee,
        };
        Self::log(Self::curve(), event.encode_log_data(), block_number, log_index)
    }

    pub fn sell_log(
        base_amount: U256,
        token_amount: U256,
        fee: U256,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::Sell {
            token: Self::token(),
            seller: Self::trader(),
            baseAmount: base_amount,
            tokenAmount: token_amount,
            fee,
        };
        Self::log(Self::curve(), event.encode_log_data(), block_number, log_index)
    }

    pub fn reward_log(
        recipient: Address,
        amount: U256,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::RewardPayout {
            token: Self::token(),
            recipient,
            amount,
        };
        Self::log(Self::curve(), event.encode_log_data(), block_number, log_index)
    }

    pub fn transfer_log(
        from: Address,
        to: Address,
        value: U256,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IContentToken::Transfer { from, to, value };
        Self::log(Self::token(), event.encode_log_data(), block_number, log_index)
    }
}

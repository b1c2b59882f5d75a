#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::keccak256;
use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::LogData;
use alloy_primitives::B256;
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use alloy_sol_types::SolEvent;
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use curvekeeper::config::CurveConfig;
use curvekeeper::error::RpcError;
use curvekeeper::model::CurveState;
use curvekeeper::rpc::abi::IBondingCurve;
use curvekeeper::rpc::abi::ICurveFactory;
use curvekeeper::rpc::abi::IContentToken;
use curvekeeper::rpc::ChainClient;
use curvekeeper::rpc::ChainLog;
use curvekeeper::rpc::TransactionReceipt;

pub const NOW: u64 = 1_700_000_000;

/// One content token with its curve, and builders for the logs that curve emits.
#[derive(Debug, Clone, Copy)]
pub struct CurveFixture {
    pub token: Address,
    pub curve: Address,
    pub creator: Address,
    pub platform: Address,
}

impl CurveFixture {
    pub fn new(seed: u8) -> Self {
        Self {
            token: Address::repeat_byte(seed),
            curve: Address::repeat_byte(seed.wrapping_add(0x40)),
            creator: Address::repeat_byte(seed.wrapping_add(0x80)),
            platform: Address::repeat_byte(0xFE),
        }
    }

    pub fn state(
        &self,
        deployment_block: u64,
    ) -> CurveState {
        CurveState::new_deployed(
            self.token,
            self.creator,
            self.platform,
            self.curve,
            CurveConfig::default().params(),
            deployment_block,
            NOW,
        )
    }

    pub fn tx_hash(
        &self,
        block_number: u64,
        log_index: u64,
    ) -> B256 {
        let mut preimage = self.token.to_vec();
        preimage.extend_from_slice(&block_number.to_be_bytes());
        preimage.extend_from_slice(&log_index.to_be_bytes());
        keccak256(preimage)
    }

    fn log(
        &self,
        address: Address,
        data: LogData,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        ChainLog {
            address,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number,
            transaction_hash: self.tx_hash(block_number, log_index),
            log_index,
            removed: false,
        }
    }

    pub fn buy(
        &self,
        buyer: Address,
        base_amount: u64,
        token_amount: u64,
        fee: u64,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::Buy {
            token: self.token,
            buyer,
            baseAmount: U256::from(base_amount),
            tokenAmount: U256::from(token_amount),
            fee: U256::from(fee),
        };
        self.log(self.curve, event.encode_log_data(), block_number, log_index)
    }

    pub fn sell(
        &self,
        seller: Address,
        base_amount: u64,
        token_amount: u64,
        fee: u64,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::Sell {
            token: self.token,
            seller,
            baseAmount: U256::from(base_amount),
            tokenAmount: U256::from(token_amount),
            fee: U256::from(fee),
        };
        self.log(self.curve, event.encode_log_data(), block_number, log_index)
    }

    pub fn reward(
        &self,
        recipient: Address,
        amount: u64,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IBondingCurve::RewardPayout {
            token: self.token,
            recipient,
            amount: U256::from(amount),
        };
        self.log(self.curve, event.encode_log_data(), block_number, log_index)
    }

    pub fn transfer(
        &self,
        from: Address,
        to: Address,
        value: u64,
        block_number: u64,
        log_index: u64,
    ) -> ChainLog {
        let event = IContentToken::Transfer {
            from,
            to,
            value: U256::from(value),
        };
        self.log(self.token, event.encode_log_data(), block_number, log_index)
    }
}

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    logs: Vec<ChainLog>,
    offline: bool,
    stalled: bool,
    balances: HashMap<Address, (U256, U256)>,
    curves_by_token: HashMap<Address, Address>,
    receipts: HashMap<B256, TransactionReceipt>,
    submissions: Vec<Address>,
}

/// Scripted chain: a head, a log history, a factory that deploys on `deployCurve`, and curves
/// that answer `getCurveState` from a balance table.
#[derive(Debug, Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    submit_delay: Duration,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head,
                ..Default::default()
            }),
            submit_delay: Duration::ZERO,
        }
    }

    /// Submissions take this long to be accepted, which widens any race between callers.
    pub fn with_submit_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn set_head(
        &self,
        head: u64,
    ) {
        self.state.lock().unwrap().head = head;
    }

    pub fn push_logs(
        &self,
        logs: impl IntoIterator<Item = ChainLog>,
    ) {
        self.state.lock().unwrap().logs.extend(logs);
    }

    /// Every call fails fast with a transport error.
    pub fn set_offline(
        &self,
        offline: bool,
    ) {
        self.state.lock().unwrap().offline = offline;
    }

    /// `eth_call` hangs instead of failing.
    pub fn set_stalled(
        &self,
        stalled: bool,
    ) {
        self.state.lock().unwrap().stalled = stalled;
    }

    pub fn set_curve_balances(
        &self,
        curve: Address,
        supply: U256,
        reserve: U256,
    ) {
        self.state.lock().unwrap().balances.insert(curve, (supply, reserve));
    }

    /// The factory knows a curve for `token` whose transaction nobody recorded.
    pub fn deploy_unrecorded(
        &self,
        token: Address,
    ) -> Address {
        let curve = Address::from_word(keccak256(token));
        self.state.lock().unwrap().curves_by_token.insert(token, curve);
        curve
    }

    /// Tokens passed to `deployCurve`, one entry per submitted transaction.
    pub fn submissions(&self) -> Vec<Address> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn ensure_online(&self) -> Result<(), RpcError> {
        if self.state.lock().unwrap().offline {
            return Err(RpcError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

fn reverted() -> RpcError {
    RpcError::Node {
        code: 3,
        message: "execution reverted".to_string(),
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_block_number(&self) -> Result<u64, RpcError> {
        self.ensure_online()?;
        Ok(self.state.lock().unwrap().head)
    }

    async fn get_logs(
        &self,
        addresses: Vec<Address>,
        topics0: Vec<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, RpcError> {
        self.ensure_online()?;
        let state = self.state.lock().unwrap();
        let mut logs: Vec<ChainLog> = state
            .logs
            .iter()
            .filter(|log| addresses.contains(&log.address))
            .filter(|log| log.topics.first().is_some_and(|t| topics0.contains(t)))
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn send_transaction(
        &self,
        _from: Address,
        to: Address,
        calldata: Bytes,
        _value: U256,
    ) -> Result<B256, RpcError> {
        self.ensure_online()?;
        let call = ICurveFactory::deployCurveCall::abi_decode(&calldata, true).map_err(|_| reverted())?;
        tokio::time::sleep(self.submit_delay).await;

        let mut state = self.state.lock().unwrap();
        state.submissions.push(call.token);
        let nonce = state.submissions.len() as u64;
        let tx_hash = keccak256(nonce.to_be_bytes());
        let curve = Address::from_word(keccak256(call.token));
        state.head += 1;
        let block_number = state.head;

        let deployed = ICurveFactory::CurveDeployed {
            token: call.token,
            creator: call.creator,
            curve,
            platform: call.platform,
        }
        .encode_log_data();
        state.curves_by_token.insert(call.token, curve);
        state.receipts.insert(tx_hash, TransactionReceipt {
            transaction_hash: tx_hash,
            block_number,
            status: 1,
            logs: vec![ChainLog {
                address: to,
                topics: deployed.topics().to_vec(),
                data: deployed.data,
                block_number,
                transaction_hash: tx_hash,
                log_index: 0,
                removed: false,
            }],
        });
        Ok(tx_hash)
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.ensure_online()?;
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, RpcError> {
        self.ensure_online()?;
        let stalled = self.state.lock().unwrap().stalled;
        if stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        let state = self.state.lock().unwrap();
        let selector = calldata.get(..4).ok_or_else(reverted)?;
        if selector == ICurveFactory::getCurveCall::SELECTOR.as_slice() {
            let call = ICurveFactory::getCurveCall::abi_decode(&calldata, true).map_err(|_| reverted())?;
            let curve = state.curves_by_token.get(&call.token).copied().unwrap_or(Address::ZERO);
            return Ok(Bytes::from(curve.abi_encode()));
        }
        if selector == IBondingCurve::getCurveStateCall::SELECTOR.as_slice() {
            let (supply, reserve) = state.balances.get(&to).copied().ok_or_else(reverted)?;
            return Ok(Bytes::from((supply, reserve).abi_encode_params()));
        }
        Err(reverted())
    }
}

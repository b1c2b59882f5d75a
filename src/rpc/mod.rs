pub mod abi;
pub mod client;
pub mod types;

use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::B256;
use alloy_primitives::U256;
use async_trait::async_trait;

pub use client::JsonRpcChainClient;
pub use types::ChainLog;
pub use types::TransactionReceipt;

use crate::error::RpcError;

/// The only surface the core uses to talk to the chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, RpcError>;

    /// Logs emitted by any of `addresses` whose first topic is one of `topics0`, inclusive range.
    async fn get_logs(
        &self,
        addresses: Vec<Address>,
        topics0: Vec<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, RpcError>;

    /// Submit a transaction signed by the endpoint on behalf of `from`.
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<B256, RpcError>;

    /// `None` while the transaction is pending or unknown.
    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    async fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, RpcError>;
}

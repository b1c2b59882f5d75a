use alloy_primitives::Address;
use alloy_primitives::B256;
use async_trait::async_trait;
use mockall::mock;

use crate::err_with_loc;
use crate::model::CurveState;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::HolderBalance;
use crate::model::IngestCursor;
use crate::model::ReserveOutcome;
use crate::model::TokenWatermark;
use crate::model::TradeEvent;
use crate::storage::BatchOutcome;
use crate::storage::CurveStore;
use crate::storage::IngestBatch;
use crate::Result;

// Mock for the persistence layer
mock! {
    pub CurveStore {}

    #[async_trait]
    impl CurveStore for CurveStore {
        async fn get_curve_state(&self, token: Address) -> Result<Option<CurveState>>;
        async fn list_active_curves(&self) -> Result<Vec<CurveState>>;
        async fn insert_curve_state(&self, state: &CurveState) -> Result<bool>;
        async fn deactivate_curve(&self, token: Address, now: u64) -> Result<bool>;
        async fn get_deployment(&self, creator: Address, token: Address) -> Result<Option<DeploymentRecord>>;
        async fn try_reserve_deployment(
            &self,
            creator: Address,
            token: Address,
            reservation_id: &str,
            now: u64,
            stale_before: u64,
        ) -> Result<ReserveOutcome>;
        async fn record_deployment_tx(
            &self,
            creator: Address,
            token: Address,
            reservation_id: &str,
            tx_hash: B256,
            now: u64,
        ) -> Result<DeploymentRecord>;
        async fn complete_deployment(
            &self,
            creator: Address,
            token: Address,
            reservation_id: &str,
            receipt: DeploymentReceipt,
            initial_state: &CurveState,
            now: u64,
        ) -> Result<DeploymentRecord>;
        async fn fail_deployment(
            &self,
            creator: Address,
            token: Address,
            reservation_id: &str,
            tx_hash: Option<B256>,
            error: &str,
            now: u64,
        ) -> Result<DeploymentRecord>;
        async fn get_cursor(&self, ingester_id: &str) -> Result<Option<IngestCursor>>;
        async fn get_watermarks(&self) -> Result<Vec<TokenWatermark>>;
        async fn apply_batch(&self, batch: &IngestBatch) -> Result<BatchOutcome>;
        async fn list_trades(&self, token: Address, limit: usize) -> Result<Vec<TradeEvent>>;
        async fn get_holder_balance(&self, token: Address, holder: Address) -> Result<Option<HolderBalance>>;
    }
}

/// A store whose every read fails, as when Postgres is unreachable.
pub fn unreachable_store() -> MockCurveStore {
    let mut store = MockCurveStore::new();
    store
        .expect_get_curve_state()
        .returning(|_| Err(err_with_loc!("connection refused")));
    store.expect_get_cursor().returning(|_| Err(err_with_loc!("connection refused")));
    store
        .expect_get_deployment()
        .returning(|_, _| Err(err_with_loc!("connection refused")));
    store
        .expect_try_reserve_deployment()
        .returning(|_, _, _, _, _| Err(err_with_loc!("connection refused")));
    store
}

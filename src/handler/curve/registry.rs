use std::sync::Arc;

use alloy_primitives::Address;
use alloy_primitives::B256;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::err_with_loc;
use crate::error::RegistryError;
use crate::model::CurveState;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::DeploymentStatus;
use crate::model::Reservation;
use crate::model::ReserveOutcome;
use crate::storage::CurveStore;
use crate::utils::now_secs;
use crate::Result;

/// Answers "is there a curve for (creator, token) and where", and hands out deployment claims.
///
/// Never touches the chain; every transition goes through the store so that the claim holds
/// across processes.
#[derive(Clone)]
pub struct CurveRegistry {
    store: Arc<dyn CurveStore>,
}

impl CurveRegistry {
    pub fn new(store: Arc<dyn CurveStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CurveStore> {
        &self.store
    }

    pub async fn exists(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<bool> {
        Ok(self.deployed_address(creator, token).await?.is_some())
    }

    /// Curve address of a DEPLOYED pair, or `RegistryError::NotFound`.
    pub async fn get(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<Address> {
        self.deployed_address(creator, token)
            .await?
            .ok_or_else(|| err_with_loc!(RegistryError::NotFound { creator, token }))
    }

    pub async fn lookup(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<Option<DeploymentRecord>> {
        self.store.get_deployment(creator, token).await
    }

    async fn deployed_address(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<Option<Address>> {
        let record = self.store.get_deployment(creator, token).await?;
        Ok(record
            .filter(|r| r.status == DeploymentStatus::Deployed)
            .and_then(|r| r.curve_address))
    }

    /// Atomic NOT_STARTED|FAILED -> DEPLOYING claim under a fresh reservation id. A DEPLOYING
    /// claim silent for longer than `claim_ttl_secs` is taken over.
    pub async fn reserve(
        &self,
        creator: Address,
        token: Address,
        claim_ttl_secs: u64,
    ) -> Result<ReserveOutcome> {
        let reservation_id = Uuid::new_v4().to_string();
        let now = now_secs();
        let outcome = self
            .store
            .try_reserve_deployment(creator, token, &reservation_id, now, now.saturating_sub(claim_ttl_secs))
            .await?;
        match &outcome {
            ReserveOutcome::Reserved(reservation) => info!(
                "deployment_reserved::creator::{}::token::{}::reservation::{}::attempt::{}",
                creator, token, reservation.reservation_id, reservation.record.attempts
            ),
            ReserveOutcome::AlreadyReserved(record) => info!(
                "deployment_already_reserved::creator::{}::token::{}::holder::{:?}",
                creator, token, record.reservation_id
            ),
            ReserveOutcome::AlreadyDeployed(record) => info!(
                "deployment_already_done::creator::{}::token::{}::curve::{:?}",
                creator, token, record.curve_address
            ),
        }
        Ok(outcome)
    }

    pub async fn record_submission(
        &self,
        reservation: &Reservation,
        tx_hash: B256,
    ) -> Result<DeploymentRecord> {
        let record = &reservation.record;
        self.store
            .record_deployment_tx(
                record.creator_address,
                record.token_address,
                &reservation.reservation_id,
                tx_hash,
                now_secs(),
            )
            .await
    }

    /// DEPLOYING -> DEPLOYED together with the initial curve state.
    pub async fn mark_deployed(
        &self,
        reservation: &Reservation,
        receipt: DeploymentReceipt,
        initial_state: &CurveState,
    ) -> Result<DeploymentRecord> {
        let record = &reservation.record;
        self.store
            .complete_deployment(
                record.creator_address,
                record.token_address,
                &reservation.reservation_id,
                receipt,
                initial_state,
                now_secs(),
            )
            .await
    }

    /// DEPLOYING -> FAILED. A submitted `tx_hash` is kept on the record for the next attempt.
    pub async fn mark_failed(
        &self,
        reservation: &Reservation,
        tx_hash: Option<B256>,
        error: &str,
    ) -> Result<DeploymentRecord> {
        let record = &reservation.record;
        self.store
            .fail_deployment(
                record.creator_address,
                record.token_address,
                &reservation.reservation_id,
                tx_hash,
                error,
                now_secs(),
            )
            .await
    }

    /// Stops ingestion for the token's curve. Records stay in place.
    pub async fn deactivate(
        &self,
        token: Address,
    ) -> Result<()> {
        if !self.store.deactivate_curve(token, now_secs()).await? {
            warn!("deactivate_unknown_curve::token::{}", token);
            return Err(err_with_loc!(RegistryError::UnknownToken(token)));
        }
        info!("curve_deactivated::token::{}", token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::in_memory::InMemoryCurveStore;
    use crate::test_utils::fixtures::TestFixtures;

    const CLAIM_TTL: u64 = 900;

    fn registry() -> CurveRegistry {
        CurveRegistry::new(Arc::new(InMemoryCurveStore::new()))
    }

    fn reserved(outcome: ReserveOutcome) -> Reservation {
        match outcome {
            ReserveOutcome::Reserved(reservation) => reservation,
            other => panic!("expected a reservation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_pair_is_not_found() {
        let registry = registry();
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());

        assert!(!registry.exists(creator, token).await.unwrap());
        let err = registry.get(creator, token).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RegistryError>(),
            Some(&RegistryError::NotFound { creator, token })
        );
    }

    #[tokio::test]
    async fn second_reserve_sees_the_first_claim() {
        let registry = registry();
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());

        let first = reserved(registry.reserve(creator, token, CLAIM_TTL).await.unwrap());
        match registry.reserve(creator, token, CLAIM_TTL).await.unwrap() {
            ReserveOutcome::AlreadyReserved(record) => {
                assert_eq!(record.reservation_id.as_deref(), Some(first.reservation_id.as_str()));
            },
            other => panic!("expected AlreadyReserved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deployed_pair_resolves_to_its_curve() {
        let registry = registry();
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());

        let reservation = reserved(registry.reserve(creator, token, CLAIM_TTL).await.unwrap());
        let tx_hash = B256::repeat_byte(0xab);
        registry.record_submission(&reservation, tx_hash).await.unwrap();
        let receipt = DeploymentReceipt {
            curve_address: TestFixtures::curve(),
            tx_hash: Some(tx_hash),
            deployment_block: 12,
        };
        let mut state = TestFixtures::curve_state();
        state.deployment_block = 12;
        registry.mark_deployed(&reservation, receipt, &state).await.unwrap();

        assert!(registry.exists(creator, token).await.unwrap());
        assert_eq!(registry.get(creator, token).await.unwrap(), TestFixtures::curve());
        assert!(matches!(
            registry.reserve(creator, token, CLAIM_TTL).await.unwrap(),
            ReserveOutcome::AlreadyDeployed(_)
        ));
    }

    #[tokio::test]
    async fn failed_attempt_can_be_reserved_again() {
        let registry = registry();
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());

        let first = reserved(registry.reserve(creator, token, CLAIM_TTL).await.unwrap());
        let failed = registry.mark_failed(&first, None, "rpc down").await.unwrap();
        assert_eq!(failed.status, DeploymentStatus::Failed);

        let second = reserved(registry.reserve(creator, token, CLAIM_TTL).await.unwrap());
        assert_ne!(second.reservation_id, first.reservation_id);
        assert_eq!(second.record.attempts, 2);
    }

    #[tokio::test]
    async fn deactivating_unknown_token_is_an_error() {
        let registry = registry();
        let err = registry.deactivate(TestFixtures::token()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownToken(_))
        ));
    }
}

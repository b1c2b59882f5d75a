use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use alloy_sol_types::SolEvent;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::registry::CurveRegistry;
use crate::config::DeployerConfig;
use crate::error::DeployError;
use crate::error::RpcError;
use crate::model::CurveParams;
use crate::model::CurveState;
use crate::model::DeployRequest;
use crate::model::DeployResponse;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::DeploymentStatus;
use crate::model::Reservation;
use crate::model::ReserveOutcome;
use crate::rpc::abi::ICurveFactory;
use crate::rpc::ChainClient;
use crate::rpc::TransactionReceipt;
use crate::utils::now_secs;

type PairKey = (Address, Address);
type Outcome = watch::Receiver<Option<DeployResponse>>;
type InFlight = Arc<Mutex<HashMap<PairKey, Outcome>>>;

/// Drives a (creator, token) pair from "no curve" to a confirmed curve contract.
///
/// Each attempt runs in its own task, so a caller that stops waiting does not cancel a
/// submitted transaction. Callers in this process that ask for a pair already in flight
/// share the running attempt; callers in other processes meet the store's DEPLOYING
/// claim and wait for its outcome instead. A claim left behind by a dead process is taken
/// over once it has been silent for the claim TTL.
#[derive(Clone)]
pub struct CurveDeployer {
    registry: CurveRegistry,
    chain: Arc<dyn ChainClient>,
    config: DeployerConfig,
    default_params: CurveParams,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
}

/// Removes the pair from the in-flight map when the leader task ends, panics included.
struct InFlightEntry {
    in_flight: InFlight,
    key: PairKey,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}

enum ForeignAttempt {
    Settled(DeployResponse),
    /// The holder stopped refreshing its claim; try to take it over.
    Stale,
}

impl CurveDeployer {
    pub fn new(
        registry: CurveRegistry,
        chain: Arc<dyn ChainClient>,
        config: DeployerConfig,
        default_params: CurveParams,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_deployments.max(1)));
        Self {
            registry,
            chain,
            config,
            default_params,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits,
        }
    }

    pub fn registry(&self) -> &CurveRegistry {
        &self.registry
    }

    #[instrument(skip(self, request), fields(creator = %request.creator_address, token = %request.token_address))]
    pub async fn deploy(
        &self,
        request: DeployRequest,
    ) -> DeployResponse {
        let key = (request.creator_address, request.token_address);

        let (leader, mut outcome) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(outcome) => (None, outcome.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key, rx.clone());
                    (Some(tx), rx)
                },
            }
        };

        let coalesced = match leader {
            Some(tx) => {
                let deployer = self.clone();
                let entry = InFlightEntry {
                    in_flight: self.in_flight.clone(),
                    key,
                };
                tokio::spawn(async move {
                    let response = match deployer.permits.clone().acquire_owned().await {
                        Ok(_permit) => deployer.run(&request).await,
                        Err(e) => DeployResponse::failed(
                            request.creator_address,
                            request.token_address,
                            None,
                            &DeployError::Storage(format!("deployment permits closed: {}", e)),
                        ),
                    };
                    drop(entry);
                    let _ = tx.send(Some(response));
                });
                false
            },
            None => {
                info!("deploy_joined_in_flight::creator::{}::token::{}", key.0, key.1);
                true
            },
        };

        let result = outcome.wait_for(|response| response.is_some()).await.map(|r| r.clone());
        match result {
            Ok(Some(mut response)) => {
                response.coalesced |= coalesced;
                response
            },
            _ => DeployResponse::failed(
                key.0,
                key.1,
                None,
                &DeployError::Storage("deployment task ended without a result".to_string()),
            ),
        }
    }

    async fn run(
        &self,
        request: &DeployRequest,
    ) -> DeployResponse {
        let (creator, token) = (request.creator_address, request.token_address);

        let (factory, sender) = match self.config.write_addresses() {
            Ok(addresses) => addresses,
            Err(e) => {
                error!("deploy_refused::creator::{}::token::{}::error::{}", creator, token, e);
                return DeployResponse::failed(creator, token, None, &DeployError::Configuration(e.to_string()));
            },
        };

        let params = request.params.unwrap_or(self.default_params);
        if let Err(e) = params.validate() {
            return DeployResponse::failed(creator, token, None, &DeployError::Configuration(e.to_string()));
        }

        loop {
            match self.registry.reserve(creator, token, self.config.claim_ttl_secs()).await {
                Ok(ReserveOutcome::AlreadyDeployed(record)) => return DeployResponse::from_record(&record, true),
                Ok(ReserveOutcome::AlreadyReserved(record)) => match self.await_foreign_attempt(record).await {
                    ForeignAttempt::Settled(response) => return response,
                    ForeignAttempt::Stale => continue,
                },
                Ok(ReserveOutcome::Reserved(reservation)) => {
                    let attempt = Attempt {
                        request,
                        params,
                        factory,
                        sender,
                        reservation: &reservation,
                    };
                    return match self.drive(&attempt).await {
                        Ok(record) => {
                            info!(
                                "curve_deployed::creator::{}::token::{}::curve::{:?}::tx::{:?}",
                                creator, token, record.curve_address, record.tx_hash
                            );
                            DeployResponse::from_record(&record, false)
                        },
                        Err((tx_hash, e)) => self.fail(&reservation, tx_hash, e).await,
                    };
                },
                Err(e) => {
                    error!("failed_to_reserve_deployment::creator::{}::token::{}::error::{}", creator, token, e);
                    return DeployResponse::failed(creator, token, None, &DeployError::Storage(e.to_string()));
                },
            }
        }
    }

    async fn drive(
        &self,
        attempt: &Attempt<'_>,
    ) -> Result<DeploymentRecord, (Option<B256>, DeployError)> {
        let token = attempt.request.token_address;

        // Whatever the record remembers, the factory and any earlier transaction are checked first.
        if let Some(record) = self.reconcile(attempt, attempt.reservation.record.tx_hash).await? {
            return Ok(record);
        }

        let calldata = ICurveFactory::deployCurveCall {
            token,
            creator: attempt.request.creator_address,
            platform: attempt.request.platform_address,
            initialSupply: attempt.request.initial_supply,
            virtualBaseReserve: attempt.params.virtual_base_reserve,
            virtualTokenReserve: attempt.params.virtual_token_reserve,
            curveSupplyCap: attempt.params.curve_supply_cap,
            feeBps: attempt.params.fee_bps,
        }
        .abi_encode();

        let tx_hash = self
            .chain
            .send_transaction(attempt.sender, attempt.factory, calldata.into(), U256::ZERO)
            .await
            .map_err(|e| (None, DeployError::Submission(e.to_string())))?;
        info!("deployment_submitted::token::{}::tx::{}", token, tx_hash);

        // The hash also reaches the record through `fail`; a later attempt reads the factory regardless.
        if let Err(e) = self.registry.record_submission(attempt.reservation, tx_hash).await {
            error!("failed_to_record_deployment_tx::token::{}::tx::{}::error::{}", token, tx_hash, e);
        }

        let receipt = match self.await_receipt(tx_hash).await {
            Some(receipt) => receipt,
            None => {
                return Err((Some(tx_hash), DeployError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: self.config.confirmation_timeout_secs,
                }));
            },
        };
        self.confirm(attempt, receipt).await
    }

    /// Looks for a curve the factory already has and at what an earlier submission did, before
    /// anything new is sent. `Ok(None)` means a fresh submission is safe.
    async fn reconcile(
        &self,
        attempt: &Attempt<'_>,
        previous_tx: Option<B256>,
    ) -> Result<Option<DeploymentRecord>, (Option<B256>, DeployError)> {
        let token = attempt.request.token_address;
        let unavailable = |e: RpcError| (previous_tx, DeployError::ReconcileUnavailable(e.to_string()));

        if let Some(curve) = self.read_factory_curve(attempt.factory, token).await.map_err(unavailable)? {
            let landed = match previous_tx {
                Some(previous_tx) => self
                    .chain
                    .get_transaction_receipt(previous_tx)
                    .await
                    .map_err(unavailable)?
                    .filter(|receipt| receipt.succeeded()),
                None => None,
            };
            let (tx_hash, deployment_block) = match landed {
                Some(receipt) => (Some(receipt.transaction_hash), receipt.block_number),
                None => {
                    // Some transaction we cannot name created it; backfill from the configured floor.
                    warn!(
                        "adopting_factory_curve_without_receipt::token::{}::curve::{}::from_block::{}",
                        token, curve, self.config.backfill_floor_block
                    );
                    (None, self.config.backfill_floor_block)
                },
            };
            info!("deployment_reconciled::token::{}::curve::{}::tx::{:?}", token, curve, tx_hash);
            return self.complete(attempt, curve, tx_hash, deployment_block).await.map(Some);
        }

        let Some(previous_tx) = previous_tx else {
            return Ok(None);
        };
        match self.chain.get_transaction_receipt(previous_tx).await.map_err(unavailable)? {
            Some(receipt) if receipt.succeeded() => self.confirm(attempt, receipt).await.map(Some),
            Some(_) => {
                warn!("previous_deployment_reverted::token::{}::tx::{}", token, previous_tx);
                Ok(None)
            },
            None => {
                // Still pending or unknown to the node: wait for it rather than risk a second curve.
                warn!("previous_deployment_pending::token::{}::tx::{}", token, previous_tx);
                match self.await_receipt(previous_tx).await {
                    Some(receipt) if receipt.succeeded() => self.confirm(attempt, receipt).await.map(Some),
                    Some(_) => Ok(None),
                    None => Err((Some(previous_tx), DeployError::ConfirmationTimeout {
                        tx_hash: previous_tx,
                        waited_secs: self.config.confirmation_timeout_secs,
                    })),
                }
            },
        }
    }

    /// Receipt is in: check status, find the curve address, persist.
    async fn confirm(
        &self,
        attempt: &Attempt<'_>,
        receipt: TransactionReceipt,
    ) -> Result<DeploymentRecord, (Option<B256>, DeployError)> {
        let tx_hash = receipt.transaction_hash;
        if !receipt.succeeded() {
            return Err((Some(tx_hash), DeployError::Reverted(tx_hash)));
        }

        let token = attempt.request.token_address;
        let curve = match curve_from_receipt(&receipt, token) {
            Some(curve) => curve,
            None => {
                warn!("curve_deployed_log_missing::token::{}::tx::{}", token, tx_hash);
                match self.read_factory_curve(attempt.factory, token).await {
                    Ok(Some(curve)) => curve,
                    Ok(None) => return Err((Some(tx_hash), DeployError::MissingCurveAddress(tx_hash))),
                    Err(e) => return Err((Some(tx_hash), DeployError::ReconcileUnavailable(e.to_string()))),
                }
            },
        };
        self.complete(attempt, curve, Some(tx_hash), receipt.block_number).await
    }

    async fn complete(
        &self,
        attempt: &Attempt<'_>,
        curve_address: Address,
        tx_hash: Option<B256>,
        deployment_block: u64,
    ) -> Result<DeploymentRecord, (Option<B256>, DeployError)> {
        let request = attempt.request;
        let initial_state = CurveState::new_deployed(
            request.token_address,
            request.creator_address,
            request.platform_address,
            curve_address,
            attempt.params,
            deployment_block,
            now_secs(),
        );
        let receipt = DeploymentReceipt {
            curve_address,
            tx_hash,
            deployment_block,
        };
        self.registry
            .mark_deployed(attempt.reservation, receipt, &initial_state)
            .await
            .map_err(|e| (tx_hash, DeployError::Storage(e.to_string())))
    }

    async fn fail(
        &self,
        reservation: &Reservation,
        tx_hash: Option<B256>,
        error: DeployError,
    ) -> DeployResponse {
        let record = &reservation.record;
        error!(
            "deployment_failed::creator::{}::token::{}::tx::{:?}::error::{}",
            record.creator_address, record.token_address, tx_hash, error
        );
        if let Err(e) = self.registry.mark_failed(reservation, tx_hash, &error.to_string()).await {
            error!(
                "failed_to_mark_deployment_failed::token::{}::error::{}",
                record.token_address, e
            );
        }
        let tx_hash = tx_hash.or(record.tx_hash);
        DeployResponse::failed(record.creator_address, record.token_address, tx_hash, &error)
    }

    /// Another process holds the claim; report its outcome once it settles, or hand back a
    /// claim that has gone silent.
    async fn await_foreign_attempt(
        &self,
        record: DeploymentRecord,
    ) -> ForeignAttempt {
        let (creator, token) = (record.creator_address, record.token_address);
        let claim_ttl = self.config.claim_ttl_secs();
        let deadline = Instant::now() + self.config.coalesce_wait();
        loop {
            match self.registry.lookup(creator, token).await {
                Ok(Some(current)) if current.status != DeploymentStatus::Deploying => {
                    return ForeignAttempt::Settled(DeployResponse::from_record(&current, true));
                },
                Ok(Some(current)) if current.updated_at < now_secs().saturating_sub(claim_ttl) => {
                    warn!(
                        "deployment_claim_stale::token::{}::holder::{:?}::last_seen::{}",
                        token, current.reservation_id, current.updated_at
                    );
                    return ForeignAttempt::Stale;
                },
                Ok(_) => {},
                Err(e) => warn!("failed_to_poll_deployment::token::{}::error::{}", token, e),
            }
            if Instant::now() >= deadline {
                let mut response = DeployResponse::failed(
                    creator,
                    token,
                    record.tx_hash,
                    &DeployError::CoalesceTimeout(self.config.coalesce_wait_secs),
                );
                response.status = DeploymentStatus::Deploying;
                response.coalesced = true;
                return ForeignAttempt::Settled(response);
            }
            tokio::time::sleep(self.config.receipt_poll_interval()).await;
        }
    }

    /// Polls for the receipt until the confirmation timeout. Transient RPC errors are retried.
    async fn await_receipt(
        &self,
        tx_hash: B256,
    ) -> Option<TransactionReceipt> {
        let deadline = Instant::now() + self.config.confirmation_timeout();
        let poll = self.config.receipt_poll_interval().max(Duration::from_millis(1));
        loop {
            match self.chain.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {},
                Err(e) => warn!("receipt_poll_failed::tx::{}::error::{}", tx_hash, e),
            }
            if Instant::now() + poll > deadline {
                return None;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Factory read-back. `None` when the factory knows no curve for the token.
    async fn read_factory_curve(
        &self,
        factory: Address,
        token: Address,
    ) -> Result<Option<Address>, RpcError> {
        let data = self
            .chain
            .call(factory, ICurveFactory::getCurveCall { token }.abi_encode().into())
            .await?;
        let ret = ICurveFactory::getCurveCall::abi_decode_returns(&data, true)
            .map_err(|e| RpcError::AbiDecode(e.to_string()))?;
        Ok((!ret.curve.is_zero()).then_some(ret.curve))
    }
}

struct Attempt<'a> {
    request: &'a DeployRequest,
    params: CurveParams,
    factory: Address,
    sender: Address,
    reservation: &'a Reservation,
}

fn curve_from_receipt(
    receipt: &TransactionReceipt,
    token: Address,
) -> Option<Address> {
    receipt
        .logs
        .iter()
        .filter(|log| log.topics.first() == Some(&ICurveFactory::CurveDeployed::SIGNATURE_HASH))
        .filter_map(|log| {
            ICurveFactory::CurveDeployed::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok()
        })
        .find(|event| event.token == token)
        .map(|event| event.curve)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use alloy_primitives::Bytes;
    use alloy_sol_types::SolValue;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::rpc::ChainLog;
    use crate::rpc::MockChainClient;
    use crate::storage::in_memory::InMemoryCurveStore;
    use crate::storage::CurveStore;
    use crate::test_utils::fixtures::TestFixtures;
    use crate::test_utils::mocks::unreachable_store;
    use crate::test_utils::mocks::MockCurveStore;

    const FLOOR_BLOCK: u64 = 25;

    fn config() -> DeployerConfig {
        DeployerConfig {
            factory_address: Some(TestFixtures::factory()),
            deployer_address: Some(TestFixtures::deployer()),
            confirmation_timeout_secs: 1,
            receipt_poll_interval_ms: 10,
            coalesce_wait_secs: 1,
            max_concurrent_deployments: 4,
            claim_ttl_secs: 900,
            backfill_floor_block: FLOOR_BLOCK,
        }
    }

    fn request() -> DeployRequest {
        DeployRequest {
            creator_address: TestFixtures::creator(),
            token_address: TestFixtures::token(),
            platform_address: TestFixtures::platform(),
            initial_supply: U256::ZERO,
            params: None,
        }
    }

    fn deployed_log(tx_hash: B256) -> ChainLog {
        let event = ICurveFactory::CurveDeployed {
            token: TestFixtures::token(),
            creator: TestFixtures::creator(),
            curve: TestFixtures::curve(),
            platform: TestFixtures::platform(),
        };
        let encoded = event.encode_log_data();
        ChainLog {
            address: TestFixtures::factory(),
            topics: encoded.topics().to_vec(),
            data: encoded.data,
            block_number: 40,
            transaction_hash: tx_hash,
            log_index: 0,
            removed: false,
        }
    }

    fn receipt(
        tx_hash: B256,
        status: u64,
        logs: Vec<ChainLog>,
    ) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: 40,
            status,
            logs,
        }
    }

    /// `getCurve` answer for a token the factory has never deployed.
    fn no_curve() -> Bytes {
        Bytes::from(Address::ZERO.abi_encode())
    }

    fn factory_curve() -> Bytes {
        Bytes::from(TestFixtures::curve().abi_encode())
    }

    fn deployer(
        chain: MockChainClient,
        store: Arc<InMemoryCurveStore>,
        config: DeployerConfig,
    ) -> CurveDeployer {
        CurveDeployer::new(
            CurveRegistry::new(store),
            Arc::new(chain),
            config,
            TestFixtures::curve_params(),
        )
    }

    /// A FAILED record left by an earlier attempt, with or without its transaction.
    async fn earlier_failure(
        store: &InMemoryCurveStore,
        tx_hash: Option<B256>,
    ) {
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());
        store
            .try_reserve_deployment(creator, token, "earlier", now_secs(), 0)
            .await
            .unwrap();
        if let Some(tx_hash) = tx_hash {
            store
                .record_deployment_tx(creator, token, "earlier", tx_hash, now_secs())
                .await
                .unwrap();
        }
        store
            .fail_deployment(creator, token, "earlier", None, "earlier attempt failed", now_secs())
            .await
            .unwrap();
    }

    async fn record(store: &InMemoryCurveStore) -> DeploymentRecord {
        store
            .get_deployment(TestFixtures::creator(), TestFixtures::token())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn deploys_and_persists_initial_state() {
        let tx_hash = B256::repeat_byte(0xd1);
        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain
            .expect_send_transaction()
            .times(1)
            .returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 1, vec![deployed_log(hash)]))));
        let store = Arc::new(InMemoryCurveStore::new());

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        assert_eq!(response.curve_address, Some(TestFixtures::curve()));
        assert_eq!(response.tx_hash, Some(tx_hash));
        assert!(!response.coalesced);
        let state = store.get_curve_state(TestFixtures::token()).await.unwrap().unwrap();
        assert_eq!(state.curve_address, TestFixtures::curve());
        assert_eq!(state.deployment_block, 40);
    }

    #[tokio::test]
    async fn missing_write_settings_refuse_without_touching_chain() {
        let chain = MockChainClient::new();
        let store = Arc::new(InMemoryCurveStore::new());
        let mut config = config();
        config.factory_address = None;

        let response = deployer(chain, store.clone(), config).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert!(!response.retryable);
        assert!(store
            .get_deployment(TestFixtures::creator(), TestFixtures::token())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn falls_back_to_factory_read_when_log_is_absent() {
        let tx_hash = B256::repeat_byte(0xd2);
        let reads = Arc::new(AtomicUsize::new(0));
        let mut chain = MockChainClient::new();
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 1, vec![]))));
        let counter = reads.clone();
        // nothing before the submission, the new curve after it
        chain.expect_call().returning(move |_, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(no_curve()),
                _ => Ok(factory_curve()),
            }
        });
        let store = Arc::new(InMemoryCurveStore::new());

        let response = deployer(chain, store, config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        assert_eq!(response.curve_address, Some(TestFixtures::curve()));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reverted_transaction_fails_retryably() {
        let tx_hash = B256::repeat_byte(0xd3);
        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 0, vec![]))));
        let store = Arc::new(InMemoryCurveStore::new());

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert!(response.retryable);
        let record = record(&store).await;
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn submission_error_marks_failed() {
        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain
            .expect_send_transaction()
            .returning(|_, _, _, _| Err(RpcError::Node { code: -32000, message: "insufficient funds".into() }));
        let store = Arc::new(InMemoryCurveStore::new());

        let response = deployer(chain, store, config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert!(response.error.unwrap().contains("insufficient funds"));
        assert!(response.tx_hash.is_none());
    }

    #[tokio::test]
    async fn store_outage_fails_before_any_submission() {
        let mut chain = MockChainClient::new();
        chain.expect_send_transaction().never();
        let deployer = CurveDeployer::new(
            CurveRegistry::new(Arc::new(unreachable_store())),
            Arc::new(chain),
            config(),
            TestFixtures::curve_params(),
        );

        let response = deployer.deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert!(response.retryable);
    }

    #[tokio::test]
    async fn timeout_keeps_tx_and_retry_reconciles_instead_of_resubmitting() {
        let tx_hash = B256::repeat_byte(0xd4);
        let store = Arc::new(InMemoryCurveStore::new());

        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(tx_hash));
        chain.expect_get_transaction_receipt().returning(|_| Ok(None));
        let mut config = config();
        config.confirmation_timeout_secs = 0;
        let first = deployer(chain, store.clone(), config.clone()).deploy(request()).await;
        assert_eq!(first.status, DeploymentStatus::Failed);
        assert_eq!(first.tx_hash, Some(tx_hash));

        // The transaction landed after all; a retry must adopt it.
        let mut chain = MockChainClient::new();
        chain.expect_send_transaction().never();
        chain.expect_call().returning(|_, _| Ok(factory_curve()));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 1, vec![deployed_log(hash)]))));
        let second = deployer(chain, store.clone(), config).deploy(request()).await;

        assert_eq!(second.status, DeploymentStatus::Deployed);
        assert_eq!(second.curve_address, Some(TestFixtures::curve()));
        assert_eq!(second.tx_hash, Some(tx_hash));
        let state = store.get_curve_state(TestFixtures::token()).await.unwrap().unwrap();
        assert_eq!(state.deployment_block, 40);
    }

    #[tokio::test]
    async fn retry_without_recorded_tx_adopts_the_factory_curve() {
        let store = Arc::new(InMemoryCurveStore::new());
        earlier_failure(&store, None).await;

        let mut chain = MockChainClient::new();
        chain.expect_call().times(1).returning(|_, _| Ok(factory_curve()));
        chain.expect_send_transaction().never();
        chain.expect_get_transaction_receipt().never();

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        assert_eq!(response.curve_address, Some(TestFixtures::curve()));
        assert_eq!(response.tx_hash, None);
        let state = store.get_curve_state(TestFixtures::token()).await.unwrap().unwrap();
        assert_eq!(state.deployment_block, FLOOR_BLOCK);
        assert_eq!(record(&store).await.attempts, 2);
    }

    #[tokio::test]
    async fn unrecorded_submission_is_kept_on_the_failed_record() {
        let tx_hash = B256::repeat_byte(0xd6);
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());
        let mut claimed = DeploymentRecord::not_started(creator, token, 1);
        claimed.status = DeploymentStatus::Deploying;
        claimed.reservation_id = Some("r".to_string());
        claimed.attempts = 1;

        let mut store = MockCurveStore::new();
        let reserved = claimed.clone();
        store.expect_try_reserve_deployment().times(1).returning(move |_, _, id, _, _| {
            Ok(ReserveOutcome::Reserved(Reservation {
                reservation_id: id.to_string(),
                record: reserved.clone(),
            }))
        });
        store
            .expect_record_deployment_tx()
            .returning(|_, _, _, _, _| Err(crate::err_with_loc!("connection reset")));
        let failed = claimed.clone();
        store
            .expect_fail_deployment()
            .withf(move |_, _, _, hash, _, _| *hash == Some(tx_hash))
            .times(1)
            .returning(move |_, _, _, hash, error, _| {
                let mut record = failed.clone();
                record.status = DeploymentStatus::Failed;
                record.tx_hash = hash;
                record.last_error = Some(error.to_string());
                Ok(record)
            });

        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 0, vec![]))));
        let deployer = CurveDeployer::new(
            CurveRegistry::new(Arc::new(store)),
            Arc::new(chain),
            config(),
            TestFixtures::curve_params(),
        );

        let response = deployer.deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert_eq!(response.tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn orphaned_claim_is_taken_over_after_its_ttl() {
        let store = Arc::new(InMemoryCurveStore::new());
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());
        // a process that claimed the pair an hour ago and died
        store
            .try_reserve_deployment(creator, token, "dead", now_secs() - 3_600, 0)
            .await
            .unwrap();

        let tx_hash = B256::repeat_byte(0xd7);
        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 1, vec![deployed_log(hash)]))));
        let mut config = config();
        config.claim_ttl_secs = 60;

        let response = deployer(chain, store.clone(), config).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        assert!(!response.coalesced);
        let record = record(&store).await;
        assert_eq!(record.attempts, 2);
        assert_eq!(record.tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn live_foreign_claim_is_waited_on_not_taken() {
        let store = Arc::new(InMemoryCurveStore::new());
        let (creator, token) = (TestFixtures::creator(), TestFixtures::token());
        store
            .try_reserve_deployment(creator, token, "other", now_secs(), 0)
            .await
            .unwrap();

        let mut chain = MockChainClient::new();
        chain.expect_send_transaction().never();
        chain.expect_call().never();

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deploying);
        assert!(response.coalesced);
        assert_eq!(record(&store).await.reservation_id.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn unreadable_previous_receipt_fails_without_guessing_a_block() {
        let previous = B256::repeat_byte(0xd8);
        let store = Arc::new(InMemoryCurveStore::new());
        earlier_failure(&store, Some(previous)).await;

        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(factory_curve()));
        chain
            .expect_get_transaction_receipt()
            .returning(|_| Err(RpcError::Transport("connection reset".into())));
        chain.expect_get_block_number().never();
        chain.expect_send_transaction().never();

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Failed);
        assert!(response.retryable);
        assert!(response.error.unwrap().contains("chain unavailable"));
        assert_eq!(response.tx_hash, Some(previous));
        assert!(store.get_curve_state(TestFixtures::token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn factory_curve_without_receipt_backfills_from_the_floor() {
        let previous = B256::repeat_byte(0xd9);
        let store = Arc::new(InMemoryCurveStore::new());
        earlier_failure(&store, Some(previous)).await;

        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(factory_curve()));
        chain.expect_get_transaction_receipt().returning(|_| Ok(None));
        chain.expect_get_block_number().never();
        chain.expect_send_transaction().never();

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        let state = store.get_curve_state(TestFixtures::token()).await.unwrap().unwrap();
        assert_eq!(state.deployment_block, FLOOR_BLOCK);
        // the earlier hash is not replaced by a guess
        assert_eq!(record(&store).await.tx_hash, Some(previous));
    }

    #[tokio::test]
    async fn reverted_previous_tx_allows_a_fresh_submission() {
        let previous = B256::repeat_byte(0xda);
        let fresh = B256::repeat_byte(0xdb);
        let store = Arc::new(InMemoryCurveStore::new());
        earlier_failure(&store, Some(previous)).await;

        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(fresh));
        chain.expect_get_transaction_receipt().returning(move |hash| {
            if hash == previous {
                Ok(Some(receipt(hash, 0, vec![])))
            } else {
                Ok(Some(receipt(hash, 1, vec![deployed_log(hash)])))
            }
        });

        let response = deployer(chain, store.clone(), config()).deploy(request()).await;

        assert_eq!(response.status, DeploymentStatus::Deployed);
        assert_eq!(response.tx_hash, Some(fresh));
        assert_eq!(record(&store).await.attempts, 2);
    }

    /// Finds no curve, then crashes on submission.
    struct CrashingChain;

    #[async_trait::async_trait]
    impl ChainClient for CrashingChain {
        async fn get_block_number(&self) -> Result<u64, RpcError> {
            Ok(0)
        }

        async fn get_logs(
            &self,
            _addresses: Vec<Address>,
            _topics0: Vec<B256>,
            _from_block: u64,
            _to_block: u64,
        ) -> Result<Vec<ChainLog>, RpcError> {
            Ok(vec![])
        }

        async fn send_transaction(
            &self,
            _from: Address,
            _to: Address,
            _calldata: Bytes,
            _value: U256,
        ) -> Result<B256, RpcError> {
            panic!("signer crashed")
        }

        async fn get_transaction_receipt(
            &self,
            _tx_hash: B256,
        ) -> Result<Option<TransactionReceipt>, RpcError> {
            Ok(None)
        }

        async fn call(
            &self,
            _to: Address,
            _calldata: Bytes,
        ) -> Result<Bytes, RpcError> {
            Ok(no_curve())
        }
    }

    #[tokio::test]
    async fn panicked_attempt_does_not_wedge_later_callers() {
        let store = Arc::new(InMemoryCurveStore::new());
        let deployer = CurveDeployer::new(
            CurveRegistry::new(store),
            Arc::new(CrashingChain),
            config(),
            TestFixtures::curve_params(),
        );

        let first = deployer.deploy(request()).await;
        assert_eq!(first.status, DeploymentStatus::Failed);
        assert!(deployer.in_flight.lock().unwrap().is_empty());

        // The second caller reaches the store's claim instead of a dead in-process entry.
        let second = deployer.deploy(request()).await;
        assert_eq!(second.status, DeploymentStatus::Deploying);
        assert!(second.error.unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_submission() {
        let tx_hash = B256::repeat_byte(0xd5);
        let mut chain = MockChainClient::new();
        chain.expect_call().returning(|_, _| Ok(no_curve()));
        chain.expect_send_transaction().times(1).returning(move |_, _, _, _| Ok(tx_hash));
        chain
            .expect_get_transaction_receipt()
            .returning(move |hash| Ok(Some(receipt(hash, 1, vec![deployed_log(hash)]))));
        let deployer = deployer(chain, Arc::new(InMemoryCurveStore::new()), config());

        let (a, b) = tokio::join!(deployer.deploy(request()), deployer.deploy(request()));

        assert_eq!(a.curve_address, Some(TestFixtures::curve()));
        assert_eq!(a.curve_address, b.curve_address);
        assert!(a.coalesced != b.coalesced);
    }
}

pub mod decoder;
pub mod health;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use self::decoder::tracked_topics;
use self::decoder::TrackedContracts;
use self::health::HealthSink;
use self::health::IngesterHealth;
use crate::config::IngesterConfig;
use crate::err_with_loc;
use crate::error::IngestError;
use crate::handler::notify::TradeNotifyOperator;
use crate::handler::shutdown::ShutdownSignal;
use crate::model::event::order_events;
use crate::model::ChainEvent;
use crate::model::CurveState;
use crate::model::IngestCursor;
use crate::model::TokenWatermark;
use crate::rpc::ChainClient;
use crate::storage::CurveStore;
use crate::storage::IngestBatch;
use crate::utils::calculate_backoff_with_jitter;
use crate::utils::now_secs;
use crate::Result;

/// One curve taking part in a scan, with the last block already applied for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMember {
    pub token_address: Address,
    pub curve_address: Address,
    pub scanned_through: u64,
}

/// Block range of the next batch and the curves whose logs it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub from_block: u64,
    pub to_block: u64,
    pub members: Vec<ScanMember>,
    /// Some curves outside this plan still have blocks below the safe head.
    pub backlog: bool,
}

impl ScanPlan {
    pub fn tracked(&self) -> TrackedContracts {
        let mut tracked = TrackedContracts::default();
        for member in &self.members {
            tracked.insert(member.token_address, member.curve_address);
        }
        tracked
    }

    /// Drops events a member already applied in an earlier, wider scan.
    pub fn is_unscanned(
        &self,
        event: &ChainEvent,
    ) -> bool {
        self.members
            .iter()
            .find(|m| m.token_address == event.token_address())
            .is_some_and(|m| event.block_number() > m.scanned_through)
    }

    pub fn watermarks(&self) -> Vec<TokenWatermark> {
        self.members
            .iter()
            .map(|m| TokenWatermark {
                token_address: m.token_address,
                last_scanned_block: self.to_block,
            })
            .collect()
    }
}

/// Picks the lowest unscanned block over all curves and walks at most `max_block_range`
/// blocks from there. Curves already past the range end are left out, so a newly tracked
/// curve backfills from its deployment block without rescanning the others.
///
/// With `live_turn`, curves within one range of `safe_head` are scanned to the head first
/// while others are still backfilling. Callers alternate turns so neither group starves.
///
/// `None` when every curve is scanned through `safe_head`.
pub fn plan_scan(
    curves: &[CurveState],
    watermarks: &HashMap<Address, u64>,
    safe_head: u64,
    max_block_range: u64,
    start_block: Option<u64>,
    live_turn: bool,
) -> Option<ScanPlan> {
    let range = max_block_range.max(1);
    let floor = start_block.map_or(0, |b| b.saturating_sub(1));
    let scanned: Vec<ScanMember> = curves
        .iter()
        .map(|curve| ScanMember {
            token_address: curve.token_address,
            curve_address: curve.curve_address,
            scanned_through: watermarks
                .get(&curve.token_address)
                .copied()
                .unwrap_or_else(|| curve.deployment_block.saturating_sub(1))
                .max(floor),
        })
        .filter(|m| m.scanned_through < safe_head)
        .collect();

    let is_live = |m: &ScanMember| m.scanned_through.saturating_add(range) >= safe_head;
    let (live, lagging): (Vec<ScanMember>, Vec<ScanMember>) = scanned.into_iter().partition(is_live);
    if live_turn && !live.is_empty() && !lagging.is_empty() {
        let from_block = live.iter().map(|m| m.scanned_through).min()? + 1;
        return Some(ScanPlan {
            from_block,
            to_block: safe_head,
            members: live,
            backlog: true,
        });
    }

    let from_block = live.iter().chain(&lagging).map(|m| m.scanned_through).min()? + 1;
    let to_block = from_block.saturating_add(range - 1).min(safe_head);
    let (members, behind): (Vec<ScanMember>, Vec<ScanMember>) =
        live.into_iter().chain(lagging).partition(|m| m.scanned_through < to_block);

    Some(ScanPlan {
        from_block,
        to_block,
        members,
        backlog: !behind.is_empty(),
    })
}

/// What one tick committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickProgress {
    pub committed_block: u64,
    pub applied: usize,
    /// No blocks left below the safe head; the loop may sleep.
    pub caught_up: bool,
}

/// The single writer of curve state. Polls the chain, applies confirmed logs in order and
/// commits events, watermarks and cursor together.
pub struct ChainEventIngester {
    store: Arc<dyn CurveStore>,
    chain: Arc<dyn ChainClient>,
    config: IngesterConfig,
    notifier: Option<TradeNotifyOperator>,
    health_sink: Option<Arc<dyn HealthSink>>,
    /// Flips every tick; see `plan_scan`.
    live_turn: AtomicBool,
}

impl ChainEventIngester {
    pub fn new(
        store: Arc<dyn CurveStore>,
        chain: Arc<dyn ChainClient>,
        config: IngesterConfig,
    ) -> Self {
        Self {
            store,
            chain,
            config,
            notifier: None,
            health_sink: None,
            live_turn: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(
        mut self,
        notifier: TradeNotifyOperator,
    ) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_health_sink(
        mut self,
        sink: Arc<dyn HealthSink>,
    ) -> Self {
        self.health_sink = Some(sink);
        self
    }

    /// Runs until `shutdown`. A batch in progress always completes before the loop exits.
    #[instrument(skip(self, shutdown), fields(ingester = %self.config.id))]
    pub async fn run(
        self,
        shutdown: ShutdownSignal,
    ) -> Result<()> {
        info!("ingester_started::id::{}", self.config.id);
        let mut health = IngesterHealth::new(self.config.id.clone(), now_secs());

        while !shutdown.is_shutdown() {
            let delay = match self.tick().await {
                Ok(progress) => {
                    health.record_success(progress.committed_block, now_secs());
                    debug!(
                        "ingester_tick::committed::{}::applied::{}::caught_up::{}",
                        progress.committed_block, progress.applied, progress.caught_up
                    );
                    if progress.caught_up { self.config.poll_interval() } else { Duration::ZERO }
                },
                Err(e) => {
                    health.record_failure(&e.to_string(), self.config.max_consecutive_failures, now_secs());
                    let delay = calculate_backoff_with_jitter(
                        health.consecutive_failures - 1,
                        self.config.base_retry_delay_ms,
                        self.config.max_retry_delay_ms,
                    );
                    if health.needs_attention {
                        error!(
                            "ingester_needs_attention::id::{}::failures::{}::error::{}",
                            self.config.id, health.consecutive_failures, e
                        );
                    } else {
                        warn!(
                            "ingester_tick_failed::attempt::{}::delay_ms::{}::error::{}",
                            health.consecutive_failures,
                            delay.as_millis(),
                            e
                        );
                    }
                    delay
                },
            };
            self.report_health(&health).await;

            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown.wait_for_shutdown() => break,
            }
        }

        info!("ingester_stopped::id::{}", self.config.id);
        Ok(())
    }

    /// One poll: plan, fetch, decode, apply. Nothing is committed unless the whole batch applies.
    pub async fn tick(&self) -> Result<TickProgress> {
        let now = now_secs();
        let head = self.chain.get_block_number().await.map_err(|e| {
            warn!("failed_to_get_block_number::error::{}", e);
            err_with_loc!(IngestError::RpcUnavailable(e.to_string()))
        })?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        let cursor = self
            .store
            .get_cursor(&self.config.id)
            .await?
            .unwrap_or_else(|| IngestCursor::new(self.config.id.clone(), 0, now));
        let curves = self.store.list_active_curves().await?;
        let watermarks: HashMap<Address, u64> = self
            .store
            .get_watermarks()
            .await?
            .into_iter()
            .map(|w| (w.token_address, w.last_scanned_block))
            .collect();

        let Some(plan) = plan_scan(
            &curves,
            &watermarks,
            safe_head,
            self.config.max_block_range,
            self.config.start_block,
            self.live_turn.fetch_xor(true, Ordering::Relaxed),
        ) else {
            if safe_head > cursor.last_processed_block {
                self.store
                    .apply_batch(&IngestBatch {
                        cursor: Some(cursor.advanced_to(safe_head, now)),
                        now,
                        ..Default::default()
                    })
                    .await?;
            }
            return Ok(TickProgress {
                committed_block: cursor.last_processed_block.max(safe_head),
                applied: 0,
                caught_up: true,
            });
        };

        let tracked = plan.tracked();
        let logs = self
            .chain
            .get_logs(tracked.addresses(), tracked_topics(), plan.from_block, plan.to_block)
            .await
            .map_err(|e| {
                warn!(
                    "failed_to_get_logs::from::{}::to::{}::error::{}",
                    plan.from_block, plan.to_block, e
                );
                err_with_loc!(IngestError::RpcUnavailable(e.to_string()))
            })?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match tracked.decode(log) {
                Ok(Some(event)) if plan.is_unscanned(&event) => events.push(event),
                Ok(_) => {},
                Err(e) => warn!("skipping_malformed_log::{}", e),
            }
        }
        order_events(&mut events);

        let batch = IngestBatch {
            events,
            cursor: Some(cursor.advanced_to(plan.to_block, now)),
            watermarks: plan.watermarks(),
            now,
        };
        let outcome = self.store.apply_batch(&batch).await.map_err(|e| {
            if let Some(IngestError::InvariantViolation { .. }) = e.downcast_ref::<IngestError>() {
                error!(
                    "batch_rejected::from::{}::to::{}::error::{}",
                    plan.from_block, plan.to_block, e
                );
            }
            e
        })?;

        if outcome.duplicates > 0 || outcome.skipped_unknown > 0 {
            debug!(
                "batch_skips::duplicates::{}::unknown_token::{}",
                outcome.duplicates, outcome.skipped_unknown
            );
        }
        if let Some(notifier) = &self.notifier {
            for event in &outcome.applied {
                if let ChainEvent::Trade(trade) = event {
                    notifier.notify(trade);
                }
            }
        }
        info!(
            "batch_committed::from::{}::to::{}::curves::{}::applied::{}",
            plan.from_block,
            plan.to_block,
            plan.members.len(),
            outcome.applied.len()
        );

        Ok(TickProgress {
            committed_block: plan.to_block,
            applied: outcome.applied.len(),
            caught_up: plan.to_block >= safe_head && !plan.backlog,
        })
    }

    async fn report_health(
        &self,
        health: &IngesterHealth,
    ) {
        if let Some(sink) = &self.health_sink {
            if let Err(e) = sink.write_health(health).await {
                warn!("failed_to_write_ingester_health::error::{}", e);
            }
        }
    }
}

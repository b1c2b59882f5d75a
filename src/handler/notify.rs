use std::sync::Arc;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::constants::TRADE_EVENT_CHANNEL;
use crate::constants::WAD;
use crate::handler::shutdown::ShutdownSignal;
use crate::model::TradeDirection;
use crate::model::TradeEvent;
use crate::storage::redis::queue::CurveQueue;
use crate::utils::format_units;
use crate::utils::serde_u256;
use crate::Result;

/// Payload published for every newly applied trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeNotification {
    #[serde(rename = "type")]
    pub kind: TradeDirection,
    pub token: Address,
    /// Token amount bought or sold.
    #[serde(with = "serde_u256")]
    pub amount: U256,
    #[serde(with = "serde_u256")]
    pub base_amount: U256,
    /// Average execution price, base units per whole token.
    #[serde(with = "serde_u256")]
    pub price: U256,
    pub trader: Address,
    pub tx_hash: B256,
    pub block: u64,
}

impl From<&TradeEvent> for TradeNotification {
    fn from(trade: &TradeEvent) -> Self {
        let price = if trade.token_amount.is_zero() {
            U256::ZERO
        } else {
            trade.base_amount.saturating_mul(U256::from(WAD)) / trade.token_amount
        };
        Self {
            kind: trade.direction,
            token: trade.token_address,
            amount: trade.token_amount,
            base_amount: trade.base_amount,
            price,
            trader: trade.trader_address,
            tx_hash: trade.transaction_hash,
            block: trade.block_number,
        }
    }
}

/// Where notifications go. Redis pub/sub in production.
#[async_trait]
pub trait TradePublisher: Send + Sync {
    async fn publish_trade(
        &self,
        notification: &TradeNotification,
    ) -> Result<()>;
}

#[async_trait]
impl TradePublisher for CurveQueue {
    async fn publish_trade(
        &self,
        notification: &TradeNotification,
    ) -> Result<()> {
        self.publish(TRADE_EVENT_CHANNEL, notification).await
    }
}

pub struct TradeNotifyHandler {
    receiver: mpsc::Receiver<TradeNotification>,
    publisher: Arc<dyn TradePublisher>,
    shutdown: ShutdownSignal,
}

async fn run_trade_notify_handler(mut handler: TradeNotifyHandler) {
    loop {
        tokio::select! {
            Some(notification) = handler.receiver.recv() => {
                match handler.publisher.publish_trade(&notification).await {
                    Ok(()) => debug!(
                        "trade_notified::token::{}::tx::{}::base::{}",
                        notification.token,
                        notification.tx_hash,
                        format_units(notification.base_amount, 18)
                    ),
                    Err(e) => error!("failed_to_publish_trade::token::{}::tx::{}::error::{}", notification.token, notification.tx_hash, e),
                }
            },
            _ = handler.shutdown.wait_for_shutdown() => {
                // Drain what is already queued, then stop.
                while let Ok(notification) = handler.receiver.try_recv() {
                    if let Err(e) = handler.publisher.publish_trade(&notification).await {
                        error!("failed_to_publish_trade::token::{}::tx::{}::error::{}", notification.token, notification.tx_hash, e);
                    }
                }
                break;
            },
            else => break,
        }
    }
}

/// Fire-and-forget front of the publisher task. Never blocks the caller.
#[derive(Clone)]
pub struct TradeNotifyOperator {
    sender: mpsc::Sender<TradeNotification>,
}

impl TradeNotifyOperator {
    pub fn new(
        publisher: Arc<dyn TradePublisher>,
        shutdown: ShutdownSignal,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_trade_notify_handler(TradeNotifyHandler {
            receiver,
            publisher,
            shutdown,
        }));
        Self { sender }
    }

    pub fn notify(
        &self,
        trade: &TradeEvent,
    ) {
        if let Err(e) = self.sender.try_send(TradeNotification::from(trade)) {
            warn!("trade_notification_dropped::token::{}::tx::{}::error::{}", trade.token_address, trade.transaction_hash, e);
        }
    }
}

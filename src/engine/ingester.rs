use std::path::Path;
use std::sync::Arc;

use tracing::error;
use tracing::info;
use tracing::instrument;

use crate::config::load_config;
use crate::config::Config;
use crate::err_with_loc;
use crate::handler::notify::TradeNotifyOperator;
use crate::handler::shutdown::ShutdownSignal;
use crate::pipeline::ingester::ChainEventIngester;
use crate::rpc::ChainClient;
use crate::rpc::JsonRpcChainClient;
use crate::storage::make_storage_engine;
use crate::storage::StorageEngine;
use crate::tracing::setup_tracing;
use crate::Result;

const ENGINE_NAME: &str = "ingester";
const NOTIFY_QUEUE_CAPACITY: usize = 1_000;

#[derive(Clone)]
pub struct IngesterEngine {
    pub config: Config,
    pub db: Arc<StorageEngine>,
    pub chain: Arc<dyn ChainClient>,
}

impl IngesterEngine {
    pub async fn run(config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        setup_tracing(ENGINE_NAME, &config.logging)?;
        info!("ingester::config_loaded::{}", config_path.display());

        let db = Arc::new(make_storage_engine(ENGINE_NAME, &config).await?);
        info!("ingester::db_engine::created");

        let chain: Arc<dyn ChainClient> =
            Arc::new(JsonRpcChainClient::new(config.rpc.clone()).map_err(|e| err_with_loc!(e))?);

        let engine = IngesterEngine { config, db, chain };
        engine.serve().await
    }

    #[instrument(skip(self), fields(ingester = %self.config.ingester.id))]
    async fn serve(self) -> Result<()> {
        let shutdown = ShutdownSignal::new();

        let mut ingester = ChainEventIngester::new(self.db.curve_store(), self.chain.clone(), self.config.ingester.clone())
            .with_health_sink(self.db.redis.kv.clone());
        if self.config.ingester.publish_trades {
            ingester = ingester.with_notifier(TradeNotifyOperator::new(
                self.db.redis.queue.clone(),
                shutdown.clone(),
                NOTIFY_QUEUE_CAPACITY,
            ));
        }

        let mut loop_handle = tokio::spawn(ingester.run(shutdown.clone()));

        tokio::select! {
            result = &mut loop_handle => {
                shutdown.shutdown();
                match result {
                    Ok(Ok(())) => info!("ingester::loop_finished"),
                    Ok(Err(e)) => error!("ingester::loop_failed::error::{}", e),
                    Err(e) => error!("ingester::loop_panicked::error::{}", e),
                }
                return Ok(());
            },
            _ = tokio::signal::ctrl_c() => {
                info!("termination_signal::graceful_shutdown");
                shutdown.shutdown();
            },
        }

        // The loop finishes its current batch before it observes the signal.
        match loop_handle.await {
            Ok(Ok(())) => info!("ingester::shutdown"),
            Ok(Err(e)) => error!("ingester::loop_failed::error::{}", e),
            Err(e) => error!("ingester::loop_panicked::error::{}", e),
        }
        Ok(())
    }
}

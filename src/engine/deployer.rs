use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::config::load_config;
use crate::config::Config;
use crate::constants::DEPLOY_REQUEST_CHANNEL;
use crate::constants::DEPLOY_RESULT_CHANNEL;
use crate::err_with_loc;
use crate::handler::curve::CurveDeployer;
use crate::handler::curve::CurveRegistry;
use crate::model::DeployRequest;
use crate::rpc::ChainClient;
use crate::rpc::JsonRpcChainClient;
use crate::storage::make_storage_engine;
use crate::storage::StorageEngine;
use crate::tracing::setup_tracing;
use crate::Result;

const ENGINE_NAME: &str = "deployer";

/// Serves deployment requests arriving on Redis pub/sub and publishes every outcome.
#[derive(Clone)]
pub struct DeployerEngine {
    pub config: Config,
    pub db: Arc<StorageEngine>,
    pub deployer: CurveDeployer,
}

impl DeployerEngine {
    pub async fn run(config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        setup_tracing(ENGINE_NAME, &config.logging)?;
        info!("deployer::config_loaded::{}", config_path.display());

        if let Err(e) = config.deployer.write_addresses() {
            // Requests are still answered, each with a configuration failure.
            error!("deployer::writes_disabled::error::{}", e);
        }

        let db = Arc::new(make_storage_engine(ENGINE_NAME, &config).await?);
        info!("deployer::db_engine::created");

        let chain: Arc<dyn ChainClient> =
            Arc::new(JsonRpcChainClient::new(config.rpc.clone()).map_err(|e| err_with_loc!(e))?);
        let deployer = CurveDeployer::new(
            CurveRegistry::new(db.curve_store()),
            chain,
            config.deployer.clone(),
            config.curve.params(),
        );

        let engine = DeployerEngine { config, db, deployer };
        engine.serve().await
    }

    #[instrument(skip(self))]
    async fn serve(self) -> Result<()> {
        let mut pubsub = self.db.redis.queue.subscribe(DEPLOY_REQUEST_CHANNEL).await?;
        info!("deployer::subscribed::{}", DEPLOY_REQUEST_CHANNEL);

        let mut tasks = JoinSet::new();
        {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            error!("deployer::request_stream_ended");
                            break;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!("deployer::unreadable_payload::error::{}", e);
                                continue;
                            },
                        };
                        let request: DeployRequest = match serde_json::from_str(&payload) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!("deployer::invalid_request::payload::{}::error::{}", payload, e);
                                continue;
                            },
                        };
                        debug!("deployer::request_received::creator::{}::token::{}", request.creator_address, request.token_address);
                        let engine = self.clone();
                        tasks.spawn(async move { engine.handle(request).await });
                        while let Some(joined) = tasks.try_join_next() {
                            if let Err(e) = joined {
                                error!("deployer::request_task_panicked::error::{}", e);
                            }
                        }
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("termination_signal::graceful_shutdown");
                        break;
                    },
                }
            }
        }

        // Submitted transactions cannot be recalled; wait for their outcomes to be recorded.
        info!("deployer::draining::{}", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("deployer::request_task_panicked::error::{}", e);
            }
        }
        info!("deployer::shutdown");
        Ok(())
    }

    async fn handle(
        &self,
        request: DeployRequest,
    ) {
        let response = self.deployer.deploy(request).await;
        info!(
            "deployer::request_done::creator::{}::token::{}::status::{}",
            response.creator_address, response.token_address, response.status
        );
        if let Err(e) = self.db.redis.queue.publish(DEPLOY_RESULT_CHANNEL, &response).await {
            error!(
                "deployer::failed_to_publish_result::token::{}::error::{}",
                response.token_address, e
            );
        }
    }
}

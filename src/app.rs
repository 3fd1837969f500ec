//! Application wiring: builds the storage, alerting and pipeline from
//! [`Config`], consumes the queue and shuts down cleanly on SIGINT/SIGTERM.

use crate::alert::{AlertService, DisabledAlerter, WebhookAlerter};
use crate::models::{Config, RabbitMqConfig, StorageBackend};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::queue::{AmqpSource, BoxDelivery};
use crate::storage::{BlobStore, FilesystemStore, S3Store};
use crate::worker::{DrainSummary, WorkerPool};
use crate::{Error, Result};
use futures::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Consumes image jobs from the queue with a fixed pool of workers.
pub struct App {
    pipeline: Arc<Pipeline>,
    pool_size: usize,
    rabbitmq: RabbitMqConfig,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub store: Arc<dyn BlobStore>,
    pub alerts: Arc<dyn AlertService>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        let pipeline = Pipeline::new(
            services.store,
            services.alerts,
            PipelineSettings::from_config(config),
        );

        Self {
            pipeline: Arc::new(pipeline),
            pool_size: config.pool_size,
            rabbitmq: config.rabbitmq.clone(),
        }
    }

    /// Construct an app, selecting the storage backend from configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn BlobStore> = match config.storage_backend {
            StorageBackend::Filesystem => {
                info!("Storage: filesystem (root {})", config.bucket);
                Arc::new(FilesystemStore::new())
            }
            StorageBackend::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| {
                    Error::Config("STORAGE_BACKEND=s3 requires S3 settings".to_string())
                })?;
                info!("Storage: s3 (bucket {}, endpoint {})", config.bucket, s3.endpoint);
                Arc::new(S3Store::new(s3).await?)
            }
        };

        let alerts: Arc<dyn AlertService> = match &config.alert_webhook_url {
            Some(url) => Arc::new(WebhookAlerter::new(url.clone())?),
            None => {
                info!("URL_BOT_DISCORD not set, alerts disabled");
                Arc::new(DisabledAlerter)
            }
        };

        Ok(Self::with_services(AppServices { store, alerts }, config))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Runs the worker pool over `deliveries` until the stream ends or
    /// `shutdown` fires, returning once every worker has drained.
    pub async fn consume<S>(&self, deliveries: S, shutdown: CancellationToken) -> DrainSummary
    where
        S: Stream<Item = BoxDelivery> + Unpin + Send,
    {
        WorkerPool::new(self.pipeline.clone(), self.pool_size)
            .run(deliveries, shutdown)
            .await
    }

    /// Connects to the broker and consumes until a termination signal.
    pub async fn run(&self) -> Result<()> {
        let prefetch = u16::try_from(self.pool_size).unwrap_or(u16::MAX);
        let source = AmqpSource::connect(&self.rabbitmq, prefetch).await?;

        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        let summary = self.consume(source.deliveries(), shutdown.clone()).await;
        // Every delivery is settled at this point; closing flushes the acks.
        source.close().await;

        if summary.failed_workers > 0 {
            warn!("{} worker(s) ended abnormally", summary.failed_workers);
        }
        if !shutdown.is_cancelled() {
            return Err(Error::ConsumerClosed(format!(
                "queue '{}' stopped delivering",
                self.rabbitmq.topic
            )));
        }

        info!("Shutdown complete");
        Ok(())
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    wait_for_signal().await;
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested signal: SIGINT"),
                _ = terminate.recv() => info!("shutdown requested signal: SIGTERM"),
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested signal: SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested signal: ctrl-c");
}

use super::{BoxDelivery, Delivery};
use crate::models::{Disposition, RabbitMqConfig};
use crate::Result;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{error, info, warn};
use uuid::Uuid;

const CONNECT_ATTEMPTS: usize = 3;
const CONNECT_RETRY_INTERVAL_MS: u64 = 2000;

pub struct AmqpDelivery {
    inner: lapin::message::Delivery,
}

impl AmqpDelivery {
    pub fn new(inner: lapin::message::Delivery) -> Self {
        Self { inner }
    }
}

impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.inner.data
    }

    fn settle(self: Box<Self>, disposition: Disposition) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let acker = self.inner.acker;
            match disposition {
                Disposition::Ack => {
                    acker.ack(BasicAckOptions::default()).await?;
                }
                Disposition::Requeue => {
                    acker
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        })
                        .await?;
                }
                Disposition::Discard => {
                    acker
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await?;
                }
            }
            Ok(())
        })
    }
}

/// An open AMQP consumer with manual acknowledgements.
pub struct AmqpSource {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

impl AmqpSource {
    /// Connects, limits unacknowledged deliveries to `prefetch` and starts
    /// consuming `config.topic`.
    pub async fn connect(config: &RabbitMqConfig, prefetch: u16) -> Result<Self> {
        let uri = config.uri();
        let uri = uri.as_str();
        let strategy =
            FixedInterval::from_millis(CONNECT_RETRY_INTERVAL_MS).take(CONNECT_ATTEMPTS - 1);

        let connection = Retry::spawn(strategy, move || async move {
            Connection::connect(uri, ConnectionProperties::default())
                .await
                .map_err(|e| {
                    warn!("Failed to connect to RabbitMQ: {}. Will retry...", e);
                    e
                })
        })
        .await?;

        let channel = connection.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("image-compressor-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                &config.topic,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            "Consuming '{}' on {}:{} (prefetch {}, tag {})",
            config.topic, config.host, config.port, prefetch, consumer_tag
        );

        Ok(Self {
            connection,
            channel,
            consumer,
        })
    }

    /// Stream of deliveries; transport errors are logged and skipped.
    pub fn deliveries(&self) -> BoxStream<'static, BoxDelivery> {
        self.consumer
            .clone()
            .filter_map(|result| async move {
                match result {
                    Ok(delivery) => Some(Box::new(AmqpDelivery::new(delivery)) as BoxDelivery),
                    Err(e) => {
                        error!("Consumer stream error: {}", e);
                        None
                    }
                }
            })
            .boxed()
    }

    /// Closes the channel and connection. Call only after every delivery has
    /// been settled so pending acks are flushed.
    pub async fn close(self) {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!("Failed to close channel: {}", e);
        }
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!("Failed to close connection: {}", e);
        }
    }
}

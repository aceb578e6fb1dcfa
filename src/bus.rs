//! Kafka transport: the request consumer loop and the response publisher.

use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{KafkaConfig, REQUEST_TOPICS};
use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;

/// Outbound side of the bus, shared sequentially by all handlers.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PipelineError>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            timeout: config.publish_timeout,
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| PipelineError::Publish(e.to_string()))?;

        self.producer
            .send(FutureRecord::<(), _>::to(topic).payload(&bytes), self.timeout)
            .await
            .map_err(|(e, _)| PipelineError::Publish(e.to_string()))?;

        info!("Published to {}: {}", topic, payload);
        Ok(())
    }
}

/// Sequential consumer: each message is dispatched to completion before
/// the next one is read.
pub struct KafkaConsumerService {
    consumer: StreamConsumer,
    dispatcher: Dispatcher,
}

impl KafkaConsumerService {
    pub fn new(config: &KafkaConfig, dispatcher: Dispatcher) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .create()
            .context("Failed to create Kafka consumer")?;

        Ok(Self {
            consumer,
            dispatcher,
        })
    }

    /// Consume until the process is stopped. Faults never end the loop.
    pub async fn run(&self) -> Result<()> {
        self.consumer
            .subscribe(&REQUEST_TOPICS)
            .context("Failed to subscribe to request topics")?;
        info!("Kafka consumer subscribed to {:?}", REQUEST_TOPICS);

        loop {
            let message = match self.consumer.recv().await {
                Ok(message) => message.detach(),
                Err(e) => {
                    warn!("Kafka receive error: {}", e);
                    continue;
                }
            };

            let payload = message.payload().unwrap_or_default();
            let outcome = self.dispatcher.dispatch(message.topic(), payload).await;
            outcome.log();
        }
    }
}

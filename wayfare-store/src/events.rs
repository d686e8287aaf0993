use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{StoreError, StoreResult};
use wayfare_core::repository::Notifier;
use wayfare_shared::models::events::AlertTriggeredEvent;
use wayfare_shared::{AppError, AppResult};

/// Publishes alert notifications to Kafka, keyed by alert id so every
/// trigger of one alert lands on the same partition.
#[derive(Clone)]
pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(brokers: &str) -> StoreResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer, topic: AlertTriggeredEvent::TOPIC.to_string() })
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_string();
        self
    }

    pub async fn publish(&self, key: &str, payload: &str) -> StoreResult<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    topic = %self.topic,
                    key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "alert notification published"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic = %self.topic, key, error = %e, "failed to publish alert notification");
                Err(StoreError::Kafka(e))
            }
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify(&self, event: &AlertTriggeredEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event)?;
        self.publish(&event.alert_id.to_string(), &payload)
            .await
            .map_err(|e| AppError::from(e).with_operation("notify"))
    }
}

/// Used when no broker is configured: the notification only reaches the log.
#[derive(Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &AlertTriggeredEvent) -> AppResult<()> {
        info!(
            alert_id = %event.alert_id,
            route = %format!("{}-{}", event.origin, event.destination),
            price = %event.price,
            max_price = %event.max_price,
            email = %event.notification_email,
            trigger_count = event.trigger_count,
            "price alert triggered"
        );
        Ok(())
    }
}

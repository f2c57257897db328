//! NATS JetStream client for event publishing and per-topic consumers
//!
//! Provides connection management, stream setup, acknowledged publishing and
//! durable pull consumers shared across processes of the same consumer group.

use std::sync::Arc;
use std::time::Duration;

use async_nats::header::NATS_MESSAGE_ID;
use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::OnceCell;

use crate::config::EventsConfig;
use crate::events::{ConsumeError, EventPublisher, MessageSource, PublishError, ReceivedMessage, Topic};

#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream_name: String,
    consumer_group: String,
    max_age: Duration,
    max_bytes: i64,
    stream_ready: Arc<OnceCell<()>>,
}

impl NatsClient {
    /// Create a client that connects in the background
    ///
    /// An unreachable broker is not an error here: the client keeps retrying,
    /// publishes fail until it is up and readiness reports it as down.
    pub async fn connect(config: &EventsConfig) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .connect(config.broker_addrs.clone())
            .await?;
        tracing::info!("NATS client created for {:?}", config.broker_addrs);

        // Get JetStream context
        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            stream_name: config.stream_name.clone(),
            consumer_group: config.consumer_group.clone(),
            max_age: config.max_age,
            max_bytes: config.max_bytes,
            stream_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Create or get the events stream, one subject per topic
    ///
    /// Runs against the broker until it succeeds once, then is a no-op.
    pub async fn ensure_stream(&self) -> Result<(), async_nats::Error> {
        self.stream_ready
            .get_or_try_init(|| async {
                self.jetstream
                    .get_or_create_stream(jetstream::stream::Config {
                        name: self.stream_name.clone(),
                        subjects: Topic::ALL.iter().map(|t| t.name().to_string()).collect(),
                        max_age: self.max_age,
                        max_bytes: self.max_bytes,
                        storage: jetstream::stream::StorageType::File,
                        num_replicas: 1,
                        ..Default::default()
                    })
                    .await?;
                tracing::info!("JetStream stream '{}' ready", self.stream_name);
                Ok::<(), async_nats::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Durable consumer name for a topic within the configured group
    pub fn durable_name(&self, topic: Topic) -> String {
        durable_name(&self.consumer_group, topic)
    }

    /// Attach to the group's durable pull consumer for `topic`
    pub async fn subscribe(&self, topic: Topic) -> Result<NatsSource, ConsumeError> {
        let durable = self.durable_name(topic);

        self.ensure_stream()
            .await
            .map_err(|e| ConsumeError::Connect(e.to_string()))?;

        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| ConsumeError::Connect(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: topic.name().to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsumeError::Connect(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| ConsumeError::Connect(e.to_string()))?;

        tracing::debug!("Attached durable consumer '{}' to {}", durable, topic);

        Ok(NatsSource {
            messages,
            pending: None,
        })
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}

#[async_trait]
impl EventPublisher for NatsClient {
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        self.ensure_stream()
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        // Publish with JetStream (durable, acknowledged)
        let ack = self
            .jetstream
            .publish(topic.name().to_string(), payload.into())
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        // Wait for acknowledgment
        let ack = ack.await.map_err(|e| PublishError::Broker(e.to_string()))?;

        tracing::debug!(
            "Published to JetStream subject {} at sequence {}",
            topic,
            ack.sequence
        );

        Ok(())
    }

    fn is_connected(&self) -> bool {
        NatsClient::is_connected(self)
    }
}

pub fn durable_name(group: &str, topic: Topic) -> String {
    format!("{}-{}", group, topic.name())
}

/// Message stream of one durable pull consumer
pub struct NatsSource {
    messages: pull::Stream,
    pending: Option<jetstream::Message>,
}

#[async_trait]
impl MessageSource for NatsSource {
    async fn read_message(&mut self) -> Result<ReceivedMessage, ConsumeError> {
        let msg = match self.messages.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => return Err(ConsumeError::Read(e.to_string())),
            None => return Err(ConsumeError::Closed),
        };

        let offset = msg
            .info()
            .map(|info| info.stream_sequence)
            .map_err(|e| ConsumeError::Read(e.to_string()))?;
        let key = msg
            .headers
            .as_ref()
            .and_then(|headers| headers.get(NATS_MESSAGE_ID))
            .map(|value| value.as_str().to_string());

        let received = ReceivedMessage {
            topic: msg.subject.to_string(),
            offset,
            key,
            value: msg.payload.to_vec(),
        };
        self.pending = Some(msg);
        Ok(received)
    }

    async fn commit(&mut self) -> Result<(), ConsumeError> {
        match self.pending.take() {
            Some(msg) => msg
                .ack()
                .await
                .map_err(|e| ConsumeError::Read(format!("ack failed: {}", e))),
            None => Ok(()),
        }
    }
}

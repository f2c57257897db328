//! Per-topic consumer loops.
//!
//! Each topic gets one long-lived loop that reads a message, logs it and
//! commits it before asking for the next one. A crash between read and commit
//! means the message is delivered again. A read error ends only that topic's
//! loop; whether it is restarted is decided by the [`RestartPolicy`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::model::Topic;
use crate::config::{RestartPolicy, MIN_BACKOFF};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeError {
    Connect(String),
    Read(String),
    /// The source will never yield another message.
    Closed,
}

impl fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeError::Connect(msg) => write!(f, "Failed to attach consumer: {}", msg),
            ConsumeError::Read(msg) => write!(f, "Error reading message: {}", msg),
            ConsumeError::Closed => write!(f, "Message source closed"),
        }
    }
}

impl std::error::Error for ConsumeError {}

/// A message as the consumer loop sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub topic: String,
    /// Position of the message in its topic.
    pub offset: u64,
    pub key: Option<String>,
    pub value: Vec<u8>,
}

/// Blocking reads from a single topic.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    async fn read_message(&mut self) -> Result<ReceivedMessage, ConsumeError>;

    /// Mark the last message returned by `read_message` as processed.
    async fn commit(&mut self) -> Result<(), ConsumeError> {
        Ok(())
    }
}

/// How a consumer loop ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerExit {
    pub topic: Topic,
    pub messages_read: u64,
    pub error: ConsumeError,
}

/// Read, log and commit until the source fails.
pub async fn run_consumer<S: MessageSource>(topic: Topic, mut source: S) -> ConsumerExit {
    tracing::info!("Consumer started for topic {}", topic);

    let mut messages_read = 0;
    loop {
        let message = match source.read_message().await {
            Ok(m) => m,
            Err(error) => {
                tracing::error!("Error reading message from topic {}: {}", topic, error);
                return ConsumerExit {
                    topic,
                    messages_read,
                    error,
                };
            }
        };
        messages_read += 1;

        tracing::info!(
            "[CONSUMER] Received message from topic {} at offset {}: {} = {}",
            message.topic,
            message.offset,
            message.key.as_deref().unwrap_or(""),
            String::from_utf8_lossy(&message.value)
        );

        if let Err(e) = source.commit().await {
            // Not fatal: the broker redelivers uncommitted messages.
            tracing::warn!(
                "Failed to commit offset {} on topic {}: {}",
                message.offset,
                topic,
                e
            );
        }
    }
}

/// Attach a source with `connect` and run it, restarting per `policy`.
///
/// With [`RestartPolicy::Terminate`] the first failure, including a failed
/// attach, ends the loop. With [`RestartPolicy::Backoff`] the delay doubles
/// after every failure up to `max` and resets once a run reads a message.
pub async fn supervise<S, F, Fut>(topic: Topic, policy: RestartPolicy, mut connect: F) -> ConsumerExit
where
    S: MessageSource,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, ConsumeError>>,
{
    let mut total_read = 0;
    let mut delay = match policy {
        RestartPolicy::Backoff { initial, .. } => initial.max(MIN_BACKOFF),
        RestartPolicy::Terminate => Duration::ZERO,
    };

    loop {
        let exit = match connect().await {
            Ok(source) => run_consumer(topic, source).await,
            Err(error) => {
                tracing::error!("Failed to start consumer for topic {}: {}", topic, error);
                ConsumerExit {
                    topic,
                    messages_read: 0,
                    error,
                }
            }
        };
        total_read += exit.messages_read;

        let (initial, max) = match policy {
            RestartPolicy::Terminate => {
                tracing::error!("Consumer for topic {} stopped: {}", topic, exit.error);
                return ConsumerExit {
                    messages_read: total_read,
                    ..exit
                };
            }
            RestartPolicy::Backoff { initial, max } => (initial, max),
        };

        if exit.messages_read > 0 {
            delay = initial.max(MIN_BACKOFF);
        }
        tracing::warn!(
            "Restarting consumer for topic {} in {:?} after: {}",
            topic,
            delay,
            exit.error
        );
        tokio::time::sleep(delay).await;
        delay = next_delay(delay, max);
    }
}

fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max).max(MIN_BACKOFF)
}

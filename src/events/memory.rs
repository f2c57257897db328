//! In-memory broker for tests and `events-service --in-memory` runs without
//! NATS.
//!
//! Keeps an append-only log per topic. Every [`MemorySource`] reads its topic
//! from the beginning and waits for new appends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::consumer::{ConsumeError, MessageSource, ReceivedMessage};
use super::model::Topic;
use super::publisher::{EventPublisher, PublishError};

#[derive(Default)]
struct Shared {
    log: Mutex<HashMap<Topic, Vec<Vec<u8>>>>,
    appended: Notify,
    failing: AtomicBool,
    disconnected: AtomicBool,
}

impl Shared {
    fn log(&self) -> MutexGuard<'_, HashMap<Topic, Vec<Vec<u8>>>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published to `topic`, oldest first.
    pub fn messages(&self, topic: Topic) -> Vec<Vec<u8>> {
        self.shared.log().get(&topic).cloned().unwrap_or_default()
    }

    /// Make every subsequent publish fail with a broker error.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.shared.disconnected.store(!connected, Ordering::SeqCst);
    }

    pub fn subscribe(&self, topic: Topic) -> MemorySource {
        MemorySource {
            shared: self.shared.clone(),
            topic,
            next: 0,
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Broker("broker unavailable".to_string()));
        }
        self.shared.log().entry(topic).or_default().push(payload);
        self.shared.appended.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.shared.disconnected.load(Ordering::SeqCst)
    }
}

pub struct MemorySource {
    shared: Arc<Shared>,
    topic: Topic,
    next: usize,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn read_message(&mut self) -> Result<ReceivedMessage, ConsumeError> {
        loop {
            // Register before checking so an append in between is not missed.
            let appended = self.shared.appended.notified();
            let found = self
                .shared
                .log()
                .get(&self.topic)
                .and_then(|messages| messages.get(self.next).cloned());

            if let Some(value) = found {
                let offset = self.next as u64;
                self.next += 1;
                return Ok(ReceivedMessage {
                    topic: self.topic.name().to_string(),
                    offset,
                    key: None,
                    value,
                });
            }
            appended.await;
        }
    }
}

//! In-process queue: one `tokio::sync::mpsc` channel per topic, a
//! named set of independent topics behind a single-consumer event
//! channel. Offsets are a monotonic per-topic counter; "commit" is a
//! no-op since the channel has already handed ownership of the message
//! to the consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use flywheel_core::Result;

use crate::{PublishResult, QueueConsumer, QueueMessage, QueueProducer};

struct Topic {
    sender: mpsc::Sender<QueueMessage>,
    next_offset: AtomicI64,
}

#[derive(Clone)]
pub struct InMemoryQueue {
    topics: Arc<Mutex<HashMap<String, Arc<Topic>>>>,
    capacity: usize,
}

impl InMemoryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Registers a consumer for `topic`, returning the receiving half.
    /// Each topic supports a single live consumer at a time, matching the
    /// one-consumer-per-topic shape the scheduler relies on.
    pub async fn consumer(&self, topic: &str) -> InMemoryConsumer {
        let mut topics = self.topics.lock().await;
        let (tx, rx) = mpsc::channel(self.capacity);
        topics.insert(
            topic.to_string(),
            Arc::new(Topic {
                sender: tx,
                next_offset: AtomicI64::new(0),
            }),
        );
        InMemoryConsumer { receiver: rx }
    }
}

#[async_trait]
impl QueueProducer for InMemoryQueue {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<PublishResult> {
        let mut topics = self.topics.lock().await;
        let entry = topics.entry(topic.to_string()).or_insert_with(|| {
            let (tx, _rx) = mpsc::channel(self.capacity);
            Arc::new(Topic {
                sender: tx,
                next_offset: AtomicI64::new(0),
            })
        });
        let offset = entry.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = QueueMessage {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
            partition: 0,
            offset,
        };
        match entry.sender.send(message).await {
            Ok(()) => Ok(PublishResult {
                success: true,
                partition: 0,
                offset,
                error_message: None,
            }),
            Err(_) => Ok(PublishResult {
                success: false,
                partition: 0,
                offset,
                error_message: Some("no consumer registered for topic".to_string()),
            }),
        }
    }
}

pub struct InMemoryConsumer {
    receiver: mpsc::Receiver<QueueMessage>,
}

#[async_trait]
impl QueueConsumer for InMemoryConsumer {
    async fn poll(&mut self) -> Result<Option<QueueMessage>> {
        Ok(self.receiver.recv().await)
    }

    async fn commit(&mut self, _message: &QueueMessage) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_poll_round_trips_payload() {
        let queue = InMemoryQueue::new(16);
        let mut consumer = queue.consumer(crate::topics::TELEMETRY_LIVE).await;
        queue
            .publish(crate::topics::TELEMETRY_LIVE, Some("k"), b"hello")
            .await
            .unwrap();
        let msg = consumer.poll().await.unwrap().unwrap();
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn offsets_increase_monotonically_per_topic() {
        let queue = InMemoryQueue::new(16);
        let mut consumer = queue.consumer(crate::topics::PATTERNS_UPDATED).await;
        queue.publish(crate::topics::PATTERNS_UPDATED, None, b"a").await.unwrap();
        queue.publish(crate::topics::PATTERNS_UPDATED, None, b"b").await.unwrap();
        let first = consumer.poll().await.unwrap().unwrap();
        let second = consumer.poll().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
    }
}

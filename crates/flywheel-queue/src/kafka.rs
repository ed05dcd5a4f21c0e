//! `rdkafka`-backed durable queue. The producer side is a cloneable
//! `FutureProducer`; the consumer side wraps a `StreamConsumer` with
//! manual offset commit.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, TopicPartitionList};

use flywheel_core::{Error, Result};

use crate::{PublishResult, QueueConsumer, QueueMessage, QueueProducer};

pub struct KafkaQueue {
    producer: FutureProducer,
}

impl KafkaQueue {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(Error::from)?;
        Ok(Self { producer })
    }

    pub fn consumer(&self, brokers: &str, group_id: &str, topic: &str) -> Result<KafkaConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(Error::from)?;
        consumer.subscribe(&[topic]).map_err(Error::from)?;
        Ok(KafkaConsumer { consumer })
    }
}

#[async_trait]
impl QueueProducer for KafkaQueue {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<PublishResult> {
        let mut record = FutureRecord::to(topic).payload(payload);
        if let Some(k) = key {
            record = record.key(k);
        }
        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok((partition, offset)) => Ok(PublishResult {
                success: true,
                partition,
                offset,
                error_message: None,
            }),
            Err((e, _)) => Ok(PublishResult {
                success: false,
                partition: -1,
                offset: -1,
                error_message: Some(e.to_string()),
            }),
        }
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl QueueConsumer for KafkaConsumer {
    async fn poll(&mut self) -> Result<Option<QueueMessage>> {
        let borrowed = self.consumer.recv().await.map_err(Error::from)?;
        Ok(Some(QueueMessage {
            topic: borrowed.topic().to_string(),
            key: borrowed
                .key()
                .map(|k| String::from_utf8_lossy(k).to_string()),
            payload: borrowed.payload().unwrap_or_default().to_vec(),
            partition: borrowed.partition(),
            offset: borrowed.offset(),
        }))
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            rdkafka::Offset::Offset(message.offset + 1),
        )
        .map_err(Error::from)?;
        self.consumer
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)
            .map_err(Error::from)?;
        Ok(())
    }
}

//! TimescaleDB-backed time-series store. A plain hypertable keyed by
//! `sequence_id`, using the same connect-and-spawn-connection-task
//! shape as the other Postgres-backed stores here — no vector
//! extensions needed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

use flywheel_core::model::{DataPoint, Quality};
use flywheel_core::{Error, Result};

use crate::TimeSeriesStore;

pub struct TimescaleStore {
    client: Arc<Mutex<Client>>,
}

impl TimescaleStore {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(Error::from)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "timescale connection error");
            }
        });

        let store = Self {
            client: Arc::new(Mutex::new(client)),
        };
        store.ensure_hypertable().await?;
        Ok(store)
    }

    async fn ensure_hypertable(&self) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(
                r#"
                CREATE EXTENSION IF NOT EXISTS timescaledb;

                CREATE TABLE IF NOT EXISTS tag_samples (
                    sequence_id BIGINT NOT NULL,
                    ts TIMESTAMPTZ NOT NULL,
                    value DOUBLE PRECISION NOT NULL,
                    quality TEXT NOT NULL,
                    source_tag TEXT,
                    received_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (sequence_id, ts)
                );
                "#,
            )
            .await
            .map_err(Error::from)?;
        client
            .execute(
                "SELECT create_hypertable('tag_samples', 'ts', if_not_exists => TRUE)",
                &[],
            )
            .await
            .ok();
        Ok(())
    }
}

fn quality_str(q: Quality) -> &'static str {
    match q {
        Quality::Good => "good",
        Quality::Uncertain => "uncertain",
        Quality::Bad => "bad",
        Quality::NotAvailable => "not_available",
        Quality::Substituted => "substituted",
    }
}

fn parse_quality(s: &str) -> Quality {
    match s {
        "uncertain" => Quality::Uncertain,
        "bad" => Quality::Bad,
        "not_available" => Quality::NotAvailable,
        "substituted" => Quality::Substituted,
        _ => Quality::Good,
    }
}

#[async_trait]
impl TimeSeriesStore for TimescaleStore {
    async fn append(&self, points: &[DataPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(Error::from)?;
        let stmt = tx
            .prepare(
                "INSERT INTO tag_samples (sequence_id, ts, value, quality, source_tag, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (sequence_id, ts) DO UPDATE SET value = EXCLUDED.value, quality = EXCLUDED.quality",
            )
            .await
            .map_err(Error::from)?;
        for point in points {
            tx.execute(
                &stmt,
                &[
                    &point.sequence_id,
                    &point.timestamp,
                    &point.value,
                    &quality_str(point.quality),
                    &point.source_tag,
                    &point.received_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        }
        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }

    async fn range(&self, sequence_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DataPoint>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT sequence_id, ts, value, quality, source_tag, received_at FROM tag_samples
                 WHERE sequence_id = $1 AND ts >= $2 AND ts < $3 ORDER BY ts",
                &[&sequence_id, &start, &end],
            )
            .await
            .map_err(Error::from)?;
        Ok(rows
            .into_iter()
            .map(|r| DataPoint {
                sequence_id: r.get("sequence_id"),
                timestamp: r.get("ts"),
                value: r.get("value"),
                quality: parse_quality(r.get("quality")),
                source_tag: r.get("source_tag"),
                received_at: r.get("received_at"),
            })
            .collect())
    }

    async fn last(&self, sequence_id: i64, now: DateTime<Utc>) -> Result<Option<DataPoint>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT sequence_id, ts, value, quality, source_tag, received_at FROM tag_samples
                 WHERE sequence_id = $1 AND ts <= $2 ORDER BY ts DESC LIMIT 1",
                &[&sequence_id, &now],
            )
            .await
            .map_err(Error::from)?;
        Ok(row.map(|r| DataPoint {
            sequence_id: r.get("sequence_id"),
            timestamp: r.get("ts"),
            value: r.get("value"),
            quality: parse_quality(r.get("quality")),
            source_tag: r.get("source_tag"),
            received_at: r.get("received_at"),
        }))
    }
}

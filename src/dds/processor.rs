//! Vault processor
//!
//! Only closed orders reach the vault. Each one is decomposed into hub, link and
//! satellite rows, written in one transaction, and followed by a single
//! product-fact event for the mart.

use super::model::VaultOrder;
use super::repository::{DdsRepository, LoadMeta};
use crate::broker::{encode_message, MessageConsumer, MessageProducer};
use crate::processor::{BatchProcessor, Outcome, ProcessorError};
use crate::types::{EnrichedOrder, CLOSED_STATUS};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;

pub struct DdsMessageProcessor {
    consumer: Box<dyn MessageConsumer>,
    producer: Box<dyn MessageProducer>,
    repository: Arc<dyn DdsRepository>,
    batch_size: usize,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl DdsMessageProcessor {
    pub fn new(
        consumer: Box<dyn MessageConsumer>,
        producer: Box<dyn MessageProducer>,
        repository: Arc<dyn DdsRepository>,
        batch_size: usize,
    ) -> Self {
        Self::new_with_timestamp_fn(
            consumer,
            producer,
            repository,
            batch_size,
            Box::new(|| Utc::now().timestamp()),
        )
    }

    /// Create with a custom timestamp function
    ///
    /// * `now_fn` - Function returning Unix timestamp (for testing)
    pub fn new_with_timestamp_fn(
        consumer: Box<dyn MessageConsumer>,
        producer: Box<dyn MessageProducer>,
        repository: Arc<dyn DdsRepository>,
        batch_size: usize,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            consumer,
            producer,
            repository,
            batch_size,
            now_fn,
        }
    }

    fn load_meta(&self) -> LoadMeta {
        let now = (self.now_fn)();
        let load_ts = DateTime::<Utc>::from_timestamp(now, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, false);

        LoadMeta {
            load_ts,
            load_src: self.consumer.topic().to_string(),
        }
    }
}

#[async_trait]
impl BatchProcessor for DdsMessageProcessor {
    fn stage(&self) -> &'static str {
        "dds"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn consumer(&mut self) -> &mut dyn MessageConsumer {
        self.consumer.as_mut()
    }

    async fn handle(&mut self, message: Value) -> Result<Outcome, ProcessorError> {
        let payload = match message.get("payload") {
            Some(payload) if !payload.is_null() => payload.clone(),
            _ => {
                log::warn!("⚠️  [dds] skipping message without payload");
                return Ok(Outcome::Skipped);
            }
        };

        if payload.get("status").and_then(Value::as_str) != Some(CLOSED_STATUS) {
            log::debug!("⏭️  [dds] order not closed, skipping");
            return Ok(Outcome::Skipped);
        }

        let order: EnrichedOrder = match serde_json::from_value(payload) {
            Ok(order) => order,
            Err(e) => {
                log::warn!("⚠️  [dds] skipping malformed order: {}", e);
                return Ok(Outcome::Skipped);
            }
        };

        let vault = match VaultOrder::decompose(&order) {
            Ok(vault) => vault,
            Err(e) => {
                log::warn!("⚠️  [dds] skipping order {}: {}", order.id, e);
                return Ok(Outcome::Skipped);
            }
        };

        let meta = self.load_meta();
        let inserted = self.repository.write_order(&vault.rows, &meta).await?;

        log::debug!(
            "💾 [dds] order {} written ({} of {} rows new)",
            order.id,
            inserted,
            vault.rows.len()
        );

        let facts = encode_message(&vault.facts)?;
        self.producer.produce(&facts).await?;

        Ok(Outcome::Processed { published: 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryTopic;
    use crate::db::test_support::{count_rows, memory_database};
    use crate::db::SharedConnection;
    use crate::dds::repository::{SatelliteMode, SqliteDdsRepository};
    use crate::keys::surrogate_key;
    use crate::types::ProductFactEvent;
    use serde_json::json;

    const BASE_TIME: i64 = 1_704_110_400;

    fn processor(
        messages: Vec<Value>,
        mode: SatelliteMode,
    ) -> (DdsMessageProcessor, MemoryTopic, SharedConnection) {
        let conn = memory_database();
        let output = MemoryTopic::new("dds-service-orders");
        let processor = DdsMessageProcessor::new_with_timestamp_fn(
            Box::new(MemoryTopic::with_messages("stg-service-orders", messages)),
            Box::new(output.clone()),
            Arc::new(SqliteDdsRepository::new(conn.clone(), mode)),
            100,
            Box::new(|| BASE_TIME),
        );
        (processor, output, conn)
    }

    fn enriched(status: &str) -> Value {
        json!({
            "object_id": "o1",
            "object_type": "order",
            "payload": {
                "id": "o1",
                "date": "2024-01-01",
                "cost": 100,
                "payment": 100,
                "status": status,
                "restaurant": {"id": "r1", "name": "Cafe"},
                "user": {"id": "u1", "name": "Alice", "login": "alice"},
                "products": [
                    {"id": "p1", "price": 50, "quantity": 2, "name": "Burger", "category": "Fastfood"}
                ]
            }
        })
    }

    fn vault_rows(conn: &SharedConnection) -> i64 {
        [
            "dds_h_user",
            "dds_h_restaurant",
            "dds_h_order",
            "dds_h_product",
            "dds_h_category",
            "dds_l_order_user",
            "dds_l_order_product",
            "dds_l_product_restaurant",
            "dds_l_product_category",
            "dds_s_user_names",
            "dds_s_restaurant_names",
            "dds_s_product_names",
            "dds_s_order_cost",
            "dds_s_order_status",
        ]
        .iter()
        .map(|table| count_rows(conn, table))
        .sum()
    }

    #[tokio::test]
    async fn test_non_closed_orders_write_nothing() {
        let (mut p, output, conn) = processor(
            vec![enriched("CANCELLED"), enriched("OPEN")],
            SatelliteMode::AlwaysInsert,
        );
        let report = p.run().await.unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(vault_rows(&conn), 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_missing_payload_is_skipped() {
        let (mut p, output, conn) = processor(
            vec![json!({"object_id": "o1"}), json!({"object_id": "o2", "payload": null})],
            SatelliteMode::AlwaysInsert,
        );
        let report = p.run().await.unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(vault_rows(&conn), 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_closed_order_fills_vault_and_publishes() {
        let (mut p, output, conn) = processor(vec![enriched("CLOSED")], SatelliteMode::AlwaysInsert);
        let report = p.run().await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(vault_rows(&conn), 14);

        let published = output.drain();
        assert_eq!(published.len(), 1);
        let facts: ProductFactEvent = serde_json::from_value(published[0].clone()).unwrap();
        assert_eq!(facts.lines.len(), 1);
        assert_eq!(facts.lines[0].product_name, "Burger");
        assert_eq!(facts.lines[0].category_name, "Fastfood");
        assert_eq!(facts.lines[0].quantity, 2);

        let guard = conn.lock().unwrap();
        let (load_ts, load_src): (String, String) = guard
            .query_row("SELECT load_ts, load_src FROM dds_h_order", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(load_ts, "2024-01-01T12:00:00+00:00");
        assert_eq!(load_src, "stg-service-orders");
    }

    #[tokio::test]
    async fn test_fact_user_id_is_order_key() {
        // Regression: the mart has always been keyed by the order surrogate key
        let (mut p, output, _conn) = processor(vec![enriched("CLOSED")], SatelliteMode::AlwaysInsert);
        p.run().await.unwrap();

        let facts = output.drain().remove(0);
        assert_eq!(facts["user_id"], json!(surrogate_key("o1")));
        assert_ne!(facts["user_id"], json!(surrogate_key("u1")));
    }

    #[tokio::test]
    async fn test_redelivery_keeps_hubs_and_links() {
        let (mut p, output, conn) = processor(
            vec![enriched("CLOSED"), enriched("CLOSED")],
            SatelliteMode::AlwaysInsert,
        );
        p.run().await.unwrap();

        assert_eq!(count_rows(&conn, "dds_h_order"), 1);
        assert_eq!(count_rows(&conn, "dds_l_order_product"), 1);
        assert_eq!(count_rows(&conn, "dds_s_order_status"), 2);
        assert_eq!(output.len(), 2);
    }

    #[tokio::test]
    async fn test_redelivery_skip_unchanged_satellites() {
        let (mut p, output, conn) = processor(
            vec![enriched("CLOSED"), enriched("CLOSED")],
            SatelliteMode::SkipUnchanged,
        );
        p.run().await.unwrap();

        assert_eq!(count_rows(&conn, "dds_s_order_status"), 1);
        assert_eq!(count_rows(&conn, "dds_s_product_names"), 1);
        // Facts are still published for every delivery
        assert_eq!(output.len(), 2);
    }

    #[tokio::test]
    async fn test_order_without_user_id_is_skipped() {
        let mut message = enriched("CLOSED");
        message["payload"]["user"]["id"] = Value::Null;

        let (mut p, output, conn) = processor(vec![message], SatelliteMode::AlwaysInsert);
        let report = p.run().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(vault_rows(&conn), 0);
        assert!(output.is_empty());
    }
}

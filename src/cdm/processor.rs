//! Aggregate processor
//!
//! Each product line of a fact event bumps two counters:
//! - product counter by the line quantity
//! - category counter by one

use super::repository::CdmRepository;
use crate::broker::MessageConsumer;
use crate::processor::{BatchProcessor, Outcome, ProcessorError};
use crate::types::ProductFactEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct CdmMessageProcessor {
    consumer: Box<dyn MessageConsumer>,
    repository: Arc<dyn CdmRepository>,
    batch_size: usize,
}

impl CdmMessageProcessor {
    pub fn new(
        consumer: Box<dyn MessageConsumer>,
        repository: Arc<dyn CdmRepository>,
        batch_size: usize,
    ) -> Self {
        Self {
            consumer,
            repository,
            batch_size,
        }
    }
}

#[async_trait]
impl BatchProcessor for CdmMessageProcessor {
    fn stage(&self) -> &'static str {
        "cdm"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn consumer(&mut self) -> &mut dyn MessageConsumer {
        self.consumer.as_mut()
    }

    async fn handle(&mut self, message: Value) -> Result<Outcome, ProcessorError> {
        let facts: ProductFactEvent = match serde_json::from_value(message) {
            Ok(facts) => facts,
            Err(e) => {
                log::warn!("⚠️  [cdm] skipping malformed product facts: {}", e);
                return Ok(Outcome::Skipped);
            }
        };

        for line in &facts.lines {
            self.repository
                .user_product_counters_insert(
                    &facts.user_id,
                    &line.product_id,
                    &line.product_name,
                    line.quantity,
                )
                .await?;
            self.repository
                .user_category_counters_insert(&facts.user_id, &line.category_id, &line.category_name)
                .await?;
        }

        log::debug!(
            "📊 [cdm] {} lines counted for {}",
            facts.lines.len(),
            facts.user_id
        );

        Ok(Outcome::Processed { published: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryTopic;
    use crate::cdm::repository::SqliteCdmRepository;
    use crate::db::test_support::{count_rows, memory_database};
    use serde_json::json;

    fn facts() -> Value {
        json!({
            "user_id": "k1",
            "product_id": ["p1", "p2"],
            "product_name": ["Burger", "Fries"],
            "category_id": ["c1", "c1"],
            "category_name": ["Fastfood", "Fastfood"],
            "order_cnt": [2, 1]
        })
    }

    fn processor(messages: Vec<Value>) -> (CdmMessageProcessor, Arc<SqliteCdmRepository>) {
        let repository = Arc::new(SqliteCdmRepository::new(memory_database()));
        let processor = CdmMessageProcessor::new(
            Box::new(MemoryTopic::with_messages("dds-service-orders", messages)),
            repository.clone(),
            100,
        );
        (processor, repository)
    }

    #[tokio::test]
    async fn test_counts_each_line() {
        let (mut p, repo) = processor(vec![facts()]);
        let report = p.run().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.published, 0);
        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(2));
        assert_eq!(repo.product_counter("k1", "p2").unwrap(), Some(1));
        // Two lines share one category
        assert_eq!(repo.category_counter("k1", "c1").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_redelivery_double_counts() {
        let (mut p, repo) = processor(vec![facts(), facts()]);
        p.run().await.unwrap();

        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(4));
        assert_eq!(repo.category_counter("k1", "c1").unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_length_mismatch_is_skipped() {
        let mut bad = facts();
        bad["order_cnt"] = json!([2]);

        let (mut p, repo) = processor(vec![bad, facts()]);
        let report = p.run().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_negative_quantity_does_not_stall_stage() {
        let mut negative = facts();
        negative["order_cnt"] = json!([-1, 1]);

        let (mut p, repo) = processor(vec![negative]);
        let report = p.run().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(-1));
        assert_eq!(repo.category_counter("k1", "c1").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_empty_fact_event_counts_nothing() {
        let conn = memory_database();
        let mut p = CdmMessageProcessor::new(
            Box::new(MemoryTopic::with_messages(
                "dds-service-orders",
                vec![json!({
                    "user_id": "k1",
                    "product_id": [],
                    "product_name": [],
                    "category_id": [],
                    "category_name": [],
                    "order_cnt": []
                })],
            )),
            Arc::new(SqliteCdmRepository::new(conn.clone())),
            100,
        );

        let report = p.run().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(count_rows(&conn, "cdm_user_product_counters"), 0);
    }
}

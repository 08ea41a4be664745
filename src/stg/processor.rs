//! Staging processor
//!
//! Per message:
//! 1. Drop messages without a payload (logged once, never retried)
//! 2. Persist the raw event verbatim into `stg_order_events`, absent envelope
//!    fields as empty text
//! 3. Resolve user and restaurant from the cache (absent or empty ids never hit
//!    the cache)
//! 4. Join order items against the restaurant menu by item id
//! 5. Publish the enriched order for the vault stage

use super::repository::StgRepository;
use crate::broker::{encode_message, MessageConsumer, MessageProducer};
use crate::cache::{CacheLookup, Entity};
use crate::db::RepositoryError;
use crate::processor::{BatchProcessor, Outcome, ProcessorError};
use crate::types::{
    value_text, EnrichedOrder, EnrichedOrderEvent, EnrichedProduct, EnrichedUser, NamedEntity,
    OrderItem, OrderPayload, RawOrderEvent, StagingRecord, UNKNOWN,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct StgMessageProcessor {
    consumer: Box<dyn MessageConsumer>,
    producer: Box<dyn MessageProducer>,
    cache: CacheLookup,
    repository: Arc<dyn StgRepository>,
    batch_size: usize,
}

impl StgMessageProcessor {
    pub fn new(
        consumer: Box<dyn MessageConsumer>,
        producer: Box<dyn MessageProducer>,
        cache: CacheLookup,
        repository: Arc<dyn StgRepository>,
        batch_size: usize,
    ) -> Self {
        Self {
            consumer,
            producer,
            cache,
            repository,
            batch_size,
        }
    }
}

/// Cache entities for the user and restaurant, in that order.
///
/// Only present ids are looked up, in a single multi-key read.
async fn lookup_entities(
    cache: &CacheLookup,
    user_id: Option<&str>,
    restaurant_id: Option<&str>,
) -> (Entity, Entity) {
    let keys: Vec<String> = [user_id, restaurant_id]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();

    let mut found = cache.multi_get(&keys).await.into_iter();

    let user = match user_id {
        Some(_) => found.next().unwrap_or_default(),
        None => Entity::new(),
    };
    let restaurant = match restaurant_id {
        Some(_) => found.next().unwrap_or_default(),
        None => Entity::new(),
    };

    (user, restaurant)
}

/// String field of a cache entity, `"unknown"` when absent
fn entity_text(entity: &Entity, field: &str) -> String {
    entity
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Join order items against the restaurant menu.
///
/// Linear scan per item, first menu entry whose `_id` matches wins. Items
/// without an id never match.
pub fn format_items(order_items: &[OrderItem], restaurant: &Entity) -> Vec<EnrichedProduct> {
    let menu: &[Value] = restaurant
        .get("menu")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    order_items
        .iter()
        .map(|item| {
            let id = item.id_text();
            let menu_item = menu
                .iter()
                .filter_map(Value::as_object)
                .filter(|_| !id.is_empty())
                .find(|entry| entry.get("_id").map(value_text).as_deref() == Some(id.as_str()));

            let (name, category) = match menu_item {
                Some(entry) => (entity_text(entry, "name"), entity_text(entry, "category")),
                None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
            };

            EnrichedProduct {
                id,
                price: item.price.clone(),
                quantity: item.quantity(),
                name,
                category,
            }
        })
        .collect()
}

#[async_trait]
impl BatchProcessor for StgMessageProcessor {
    fn stage(&self) -> &'static str {
        "stg"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn consumer(&mut self) -> &mut dyn MessageConsumer {
        self.consumer.as_mut()
    }

    async fn handle(&mut self, message: Value) -> Result<Outcome, ProcessorError> {
        let raw: RawOrderEvent = match serde_json::from_value(message) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("⚠️  [stg] skipping malformed message: {}", e);
                return Ok(Outcome::Skipped);
            }
        };

        let payload = match raw.payload {
            Some(payload) if !payload.is_null() => payload,
            _ => {
                log::warn!("⚠️  [stg] skipping message without payload: object_id={}", raw.object_id);
                return Ok(Outcome::Skipped);
            }
        };

        let record = StagingRecord {
            object_id: raw.object_id.clone(),
            object_type: raw.object_type.clone(),
            sent_timestamp: raw.sent_timestamp.clone(),
            payload_json: serde_json::to_string(&payload).map_err(RepositoryError::from)?,
        };
        self.repository.order_events_insert(&record).await?;

        log::debug!("💾 [stg] staged object_id={}", raw.object_id);

        let order: OrderPayload = match serde_json::from_value(payload) {
            Ok(order) => order,
            Err(e) => {
                log::warn!(
                    "⚠️  [stg] staged but not enriched, malformed order object_id={}: {}",
                    raw.object_id,
                    e
                );
                return Ok(Outcome::Skipped);
            }
        };

        let user_id = order
            .user
            .and_then(|u| u.id)
            .filter(|id| !id.is_empty());
        let restaurant_id = order
            .restaurant
            .and_then(|r| r.id)
            .filter(|id| !id.is_empty());

        let (user, restaurant) =
            lookup_entities(&self.cache, user_id.as_deref(), restaurant_id.as_deref()).await;

        let products = format_items(&order.order_items, &restaurant);

        let event = EnrichedOrderEvent {
            object_id: raw.object_id.clone(),
            object_type: "order".to_string(),
            payload: EnrichedOrder {
                id: raw.object_id.clone(),
                date: order.date,
                cost: order.cost,
                payment: order.payment,
                status: order.final_status,
                restaurant: NamedEntity {
                    id: restaurant_id,
                    name: entity_text(&restaurant, "name"),
                },
                user: EnrichedUser {
                    id: user_id,
                    name: entity_text(&user, "name"),
                    login: entity_text(&user, "login"),
                },
                products,
            },
        };

        let message = encode_message(&event)?;
        self.producer.produce(&message).await?;

        log::debug!(
            "📤 [stg] published object_id={} ({} products)",
            raw.object_id,
            event.payload.products.len()
        );

        Ok(Outcome::Processed { published: 1 })
    }
}

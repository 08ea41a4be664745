//! Message contracts between the stages
//!
//! ```text
//! source topic ──RawOrderEvent──▶ stg ──EnrichedOrderEvent──▶ dds ──ProductFactEvent──▶ cdm
//! ```
//!
//! Identifiers arrive as either JSON strings or numbers depending on the upstream
//! service; they are normalized to their textual form on decode.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder for names and categories the cache could not resolve
pub const UNKNOWN: &str = "unknown";

/// Status of an order that reached its terminal state
pub const CLOSED_STATUS: &str = "CLOSED";

fn identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {}",
            other
        ))),
    }
}

fn optional_identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {}",
            other
        ))),
    }
}

/// Any present scalar as text, absent or `null` as the empty string
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(&Value::deserialize(deserializer)?))
}

fn optional_quantity<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(quantity_value))
}

/// Order line quantity as an integer.
///
/// Accepts integers, whole floats (`2.0`) and numeric strings. Anything else,
/// fractional floats included, is treated as absent.
pub fn quantity_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Textual form of a JSON scalar as used in keys, hashdiffs and id comparisons.
///
/// Strings are taken verbatim (no quotes); numbers and booleans use their JSON
/// text; `null` becomes the empty string.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

// ---------------------------------------------------------------------------
// Source topic
// ---------------------------------------------------------------------------

/// One message of the source topic
///
/// `payload` is kept as raw JSON: staging persists it verbatim before it is
/// interpreted as an [`OrderPayload`]. Absent envelope scalars decode as empty
/// text so the event can still be staged.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderEvent {
    #[serde(default, deserialize_with = "lenient_text")]
    pub object_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub object_type: String,
    #[serde(alias = "sent_dttm", default, deserialize_with = "lenient_text")]
    pub sent_timestamp: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// The order nested in a [`RawOrderEvent`] payload
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    #[serde(default, deserialize_with = "optional_identifier")]
    pub id: Option<String>,
    pub date: String,
    pub cost: Value,
    pub payment: Value,
    pub final_status: String,
    #[serde(default)]
    pub user: Option<EntityRef>,
    #[serde(default)]
    pub restaurant: Option<EntityRef>,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityRef {
    #[serde(default, deserialize_with = "optional_identifier")]
    pub id: Option<String>,
}

/// Order line as sent upstream; fields pass through untyped
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub quantity: Value,
}

impl OrderItem {
    pub fn id_text(&self) -> String {
        value_text(&self.id)
    }

    pub fn quantity(&self) -> Option<i64> {
        quantity_value(&self.quantity)
    }
}

/// Row of `stg_order_events`
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRecord {
    pub object_id: String,
    pub object_type: String,
    pub sent_timestamp: String,
    pub payload_json: String,
}

// ---------------------------------------------------------------------------
// stg -> dds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedOrderEvent {
    #[serde(deserialize_with = "identifier")]
    pub object_id: String,
    pub object_type: String,
    pub payload: EnrichedOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedOrder {
    #[serde(deserialize_with = "identifier")]
    pub id: String,
    pub date: String,
    pub cost: Value,
    pub payment: Value,
    pub status: String,
    pub restaurant: NamedEntity,
    pub user: EnrichedUser,
    #[serde(default)]
    pub products: Vec<EnrichedProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    #[serde(default, deserialize_with = "optional_identifier")]
    pub id: Option<String>,
    #[serde(default = "unknown")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedUser {
    #[serde(default, deserialize_with = "optional_identifier")]
    pub id: Option<String>,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown")]
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProduct {
    #[serde(deserialize_with = "identifier")]
    pub id: String,
    #[serde(default)]
    pub price: Value,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub quantity: Option<i64>,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown")]
    pub category: String,
}

// ---------------------------------------------------------------------------
// dds -> cdm
// ---------------------------------------------------------------------------

/// One order line as seen by the mart
#[derive(Debug, Clone, PartialEq)]
pub struct ProductLine {
    pub product_id: String,
    pub product_name: String,
    pub category_id: String,
    pub category_name: String,
    pub quantity: i64,
}

/// Per-order product facts published by the vault stage
///
/// `user_id` carries the ORDER surrogate key, not a user identifier. That is what
/// the downstream counters have always been keyed by; see DESIGN.md before
/// changing it.
///
/// On the wire the lines travel as parallel arrays (see [`ProductFactWire`]);
/// decoding rejects arrays of unequal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ProductFactWire", try_from = "ProductFactWire")]
pub struct ProductFactEvent {
    pub user_id: String,
    pub lines: Vec<ProductLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFactWire {
    pub user_id: String,
    pub product_id: Vec<String>,
    pub product_name: Vec<String>,
    pub category_id: Vec<String>,
    pub category_name: Vec<String>,
    pub order_cnt: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LengthMismatch {
    pub product_id: usize,
    pub product_name: usize,
    pub category_id: usize,
    pub category_name: usize,
    pub order_cnt: usize,
}

impl std::fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "product fact arrays differ in length (product_id={}, product_name={}, category_id={}, category_name={}, order_cnt={})",
            self.product_id, self.product_name, self.category_id, self.category_name, self.order_cnt
        )
    }
}

impl std::error::Error for LengthMismatch {}

impl From<ProductFactEvent> for ProductFactWire {
    fn from(event: ProductFactEvent) -> Self {
        let mut wire = ProductFactWire {
            user_id: event.user_id,
            product_id: Vec::with_capacity(event.lines.len()),
            product_name: Vec::with_capacity(event.lines.len()),
            category_id: Vec::with_capacity(event.lines.len()),
            category_name: Vec::with_capacity(event.lines.len()),
            order_cnt: Vec::with_capacity(event.lines.len()),
        };
        for line in event.lines {
            wire.product_id.push(line.product_id);
            wire.product_name.push(line.product_name);
            wire.category_id.push(line.category_id);
            wire.category_name.push(line.category_name);
            wire.order_cnt.push(line.quantity);
        }
        wire
    }
}

impl TryFrom<ProductFactWire> for ProductFactEvent {
    type Error = LengthMismatch;

    fn try_from(wire: ProductFactWire) -> Result<Self, Self::Error> {
        let len = wire.product_id.len();
        let equal = [
            wire.product_name.len(),
            wire.category_id.len(),
            wire.category_name.len(),
            wire.order_cnt.len(),
        ]
        .iter()
        .all(|l| *l == len);

        if !equal {
            return Err(LengthMismatch {
                product_id: wire.product_id.len(),
                product_name: wire.product_name.len(),
                category_id: wire.category_id.len(),
                category_name: wire.category_name.len(),
                order_cnt: wire.order_cnt.len(),
            });
        }

        let lines = wire
            .product_id
            .into_iter()
            .zip(wire.product_name)
            .zip(wire.category_id)
            .zip(wire.category_name)
            .zip(wire.order_cnt)
            .map(
                |((((product_id, product_name), category_id), category_name), quantity)| {
                    ProductLine {
                        product_id,
                        product_name,
                        category_id,
                        category_name,
                        quantity,
                    }
                },
            )
            .collect();

        Ok(ProductFactEvent {
            user_id: wire.user_id,
            lines,
        })
    }
}

//! Decomposition of an enriched order into data vault rows
//!
//! Pure: no I/O, no clock. The repository decides how each row is written.
//!
//! Row order for one order:
//!
//! ```text
//! h_user, h_restaurant, h_order
//! l_order_user
//! s_user_names, s_restaurant_names, s_order_cost, s_order_status
//! per product line:
//!     h_product, h_category
//!     l_order_product, l_product_restaurant, l_product_category
//!     s_product_names
//! ```
//!
//! Parents always precede the rows that reference them.

use crate::keys::{composite_key, surrogate_key};
use crate::types::{value_text, EnrichedOrder, ProductFactEvent, ProductLine};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hub {
    User,
    Restaurant,
    Product,
    Category,
}

impl Hub {
    pub fn table(self) -> &'static str {
        match self {
            Hub::User => "dds_h_user",
            Hub::Restaurant => "dds_h_restaurant",
            Hub::Product => "dds_h_product",
            Hub::Category => "dds_h_category",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Hub::User => "h_user_pk",
            Hub::Restaurant => "h_restaurant_pk",
            Hub::Product => "h_product_pk",
            Hub::Category => "h_category_pk",
        }
    }

    pub fn business_column(self) -> &'static str {
        match self {
            Hub::User => "user_id",
            Hub::Restaurant => "restaurant_id",
            Hub::Product => "product_id",
            Hub::Category => "category_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    OrderUser,
    OrderProduct,
    ProductRestaurant,
    ProductCategory,
}

impl Link {
    pub fn table(self) -> &'static str {
        match self {
            Link::OrderUser => "dds_l_order_user",
            Link::OrderProduct => "dds_l_order_product",
            Link::ProductRestaurant => "dds_l_product_restaurant",
            Link::ProductCategory => "dds_l_product_category",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Link::OrderUser => "hk_order_user_pk",
            Link::OrderProduct => "hk_order_product_pk",
            Link::ProductRestaurant => "hk_product_restaurant_pk",
            Link::ProductCategory => "hk_product_category_pk",
        }
    }

    /// Hub key columns in the order the link key concatenates them
    pub fn parent_columns(self) -> [&'static str; 2] {
        match self {
            Link::OrderUser => ["h_order_pk", "h_user_pk"],
            Link::OrderProduct => ["h_order_pk", "h_product_pk"],
            Link::ProductRestaurant => ["h_product_pk", "h_restaurant_pk"],
            Link::ProductCategory => ["h_product_pk", "h_category_pk"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satellite {
    UserNames,
    RestaurantNames,
    ProductNames,
    OrderCost,
    OrderStatus,
}

impl Satellite {
    pub fn table(self) -> &'static str {
        match self {
            Satellite::UserNames => "dds_s_user_names",
            Satellite::RestaurantNames => "dds_s_restaurant_names",
            Satellite::ProductNames => "dds_s_product_names",
            Satellite::OrderCost => "dds_s_order_cost",
            Satellite::OrderStatus => "dds_s_order_status",
        }
    }

    pub fn parent_column(self) -> &'static str {
        match self {
            Satellite::UserNames => "h_user_pk",
            Satellite::RestaurantNames => "h_restaurant_pk",
            Satellite::ProductNames => "h_product_pk",
            Satellite::OrderCost | Satellite::OrderStatus => "h_order_pk",
        }
    }

    pub fn attribute_columns(self) -> &'static [&'static str] {
        match self {
            Satellite::UserNames => &["username", "userlogin"],
            Satellite::RestaurantNames | Satellite::ProductNames => &["name"],
            Satellite::OrderCost => &["cost", "payment"],
            Satellite::OrderStatus => &["status"],
        }
    }

    pub fn hashdiff_column(self) -> &'static str {
        match self {
            Satellite::UserNames => "hk_user_names_hashdiff",
            Satellite::RestaurantNames => "hk_restaurant_names_hashdiff",
            Satellite::ProductNames => "hk_product_names_hashdiff",
            Satellite::OrderCost => "hk_order_cost_hashdiff",
            Satellite::OrderStatus => "hk_order_status_hashdiff",
        }
    }
}

/// One row to write into the vault
#[derive(Debug, Clone, PartialEq)]
pub enum VaultRow {
    Hub {
        hub: Hub,
        pk: String,
        business_id: String,
    },
    /// `h_order` carries the order date besides its business id
    OrderHub {
        pk: String,
        order_id: String,
        order_dt: String,
    },
    Link {
        link: Link,
        pk: String,
        parents: [String; 2],
    },
    Satellite {
        satellite: Satellite,
        parent_pk: String,
        attributes: Vec<Value>,
        hashdiff: String,
    },
}

impl VaultRow {
    pub fn table(&self) -> &'static str {
        match self {
            VaultRow::Hub { hub, .. } => hub.table(),
            VaultRow::OrderHub { .. } => "dds_h_order",
            VaultRow::Link { link, .. } => link.table(),
            VaultRow::Satellite { satellite, .. } => satellite.table(),
        }
    }

    fn hub(hub: Hub, business_id: &str) -> Self {
        VaultRow::Hub {
            hub,
            pk: surrogate_key(business_id),
            business_id: business_id.to_string(),
        }
    }

    fn link(link: Link, left: &str, right: &str) -> Self {
        VaultRow::Link {
            link,
            pk: composite_key(&[left, right]),
            parents: [left.to_string(), right.to_string()],
        }
    }

    /// Hashdiff = key(parent_pk ∘ textual attribute values)
    fn satellite(satellite: Satellite, parent_pk: &str, attributes: Vec<Value>) -> Self {
        let texts: Vec<String> = attributes.iter().map(value_text).collect();
        let mut parts: Vec<&str> = Vec::with_capacity(texts.len() + 1);
        parts.push(parent_pk);
        parts.extend(texts.iter().map(String::as_str));

        VaultRow::Satellite {
            satellite,
            parent_pk: parent_pk.to_string(),
            hashdiff: composite_key(&parts),
            attributes,
        }
    }
}

/// Satellite hashdiff of user names
///
/// Only the name is tracked; a login change alone yields the same hashdiff.
fn user_names(h_user_pk: &str, name: &str, login: &str) -> VaultRow {
    VaultRow::Satellite {
        satellite: Satellite::UserNames,
        parent_pk: h_user_pk.to_string(),
        attributes: vec![Value::from(name), Value::from(login)],
        hashdiff: composite_key(&[h_user_pk, name]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecomposeError {
    MissingUserId,
    MissingRestaurantId,
}

impl std::fmt::Display for DecomposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecomposeError::MissingUserId => write!(f, "order has no user id"),
            DecomposeError::MissingRestaurantId => write!(f, "order has no restaurant id"),
        }
    }
}

impl std::error::Error for DecomposeError {}

/// Vault rows and the downstream fact event of one order
#[derive(Debug, Clone, PartialEq)]
pub struct VaultOrder {
    pub rows: Vec<VaultRow>,
    pub facts: ProductFactEvent,
}

impl VaultOrder {
    pub fn decompose(order: &EnrichedOrder) -> Result<Self, DecomposeError> {
        let user_id = order
            .user
            .id
            .as_deref()
            .ok_or(DecomposeError::MissingUserId)?;
        let restaurant_id = order
            .restaurant
            .id
            .as_deref()
            .ok_or(DecomposeError::MissingRestaurantId)?;

        let h_user_pk = surrogate_key(user_id);
        let h_restaurant_pk = surrogate_key(restaurant_id);
        let h_order_pk = surrogate_key(&order.id);

        let mut rows = vec![
            VaultRow::hub(Hub::User, user_id),
            VaultRow::hub(Hub::Restaurant, restaurant_id),
            VaultRow::OrderHub {
                pk: h_order_pk.clone(),
                order_id: order.id.clone(),
                order_dt: order.date.clone(),
            },
            VaultRow::link(Link::OrderUser, &h_order_pk, &h_user_pk),
            user_names(&h_user_pk, &order.user.name, &order.user.login),
            VaultRow::satellite(
                Satellite::RestaurantNames,
                &h_restaurant_pk,
                vec![Value::from(order.restaurant.name.as_str())],
            ),
            VaultRow::satellite(
                Satellite::OrderCost,
                &h_order_pk,
                vec![order.cost.clone(), order.payment.clone()],
            ),
            VaultRow::satellite(
                Satellite::OrderStatus,
                &h_order_pk,
                vec![Value::from(order.status.as_str())],
            ),
        ];

        let mut lines = Vec::with_capacity(order.products.len());

        for product in &order.products {
            let h_product_pk = surrogate_key(&product.id);
            let h_category_pk = surrogate_key(&product.category);

            rows.push(VaultRow::hub(Hub::Product, &product.id));
            rows.push(VaultRow::hub(Hub::Category, &product.category));
            rows.push(VaultRow::link(Link::OrderProduct, &h_order_pk, &h_product_pk));
            rows.push(VaultRow::link(
                Link::ProductRestaurant,
                &h_product_pk,
                &h_restaurant_pk,
            ));
            rows.push(VaultRow::link(
                Link::ProductCategory,
                &h_product_pk,
                &h_category_pk,
            ));
            rows.push(VaultRow::satellite(
                Satellite::ProductNames,
                &h_product_pk,
                vec![Value::from(product.name.as_str())],
            ));

            lines.push(ProductLine {
                product_id: h_product_pk,
                product_name: product.name.clone(),
                category_id: h_category_pk,
                category_name: product.category.clone(),
                quantity: product.quantity.unwrap_or(1),
            });
        }

        Ok(VaultOrder {
            rows,
            facts: ProductFactEvent {
                // Downstream counters are keyed by the order key
                user_id: h_order_pk,
                lines,
            },
        })
    }
}

//! Data vault store
//!
//! Hubs and links are insert-if-absent on their surrogate key, so a redelivered
//! order leaves them untouched. Satellites are versioned; whether a redelivery
//! appends a new version is governed by [`SatelliteMode`].

use super::model::{Satellite, VaultRow};
use crate::db::{lock, sql_value, RepositoryError, SharedConnection};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

/// How satellite rows are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SatelliteMode {
    /// Every write appends a version, even with an unchanged hashdiff
    #[default]
    AlwaysInsert,
    /// Append only when the newest stored hashdiff of the parent differs
    SkipUnchanged,
}

impl SatelliteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" | "always_insert" => Some(SatelliteMode::AlwaysInsert),
            "skip_unchanged" => Some(SatelliteMode::SkipUnchanged),
            _ => None,
        }
    }
}

/// Load metadata stamped on every row of one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMeta {
    pub load_ts: String,
    pub load_src: String,
}

#[async_trait]
pub trait DdsRepository: Send + Sync {
    /// Write the rows of one order atomically
    ///
    /// Returns the number of rows actually inserted.
    async fn write_order(&self, rows: &[VaultRow], meta: &LoadMeta) -> Result<usize, RepositoryError>;
}

pub struct SqliteDdsRepository {
    conn: SharedConnection,
    mode: SatelliteMode,
}

impl SqliteDdsRepository {
    pub fn new(conn: SharedConnection, mode: SatelliteMode) -> Self {
        Self { conn, mode }
    }

    fn write_row(
        &self,
        tx: &Transaction<'_>,
        row: &VaultRow,
        meta: &LoadMeta,
    ) -> Result<usize, RepositoryError> {
        let inserted = match row {
            VaultRow::Hub {
                hub,
                pk,
                business_id,
            } => {
                let sql = format!(
                    "INSERT INTO {table} ({key}, {business}, load_ts, load_src)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT({key}) DO NOTHING",
                    table = hub.table(),
                    key = hub.key_column(),
                    business = hub.business_column(),
                );
                tx.execute(&sql, params![pk, business_id, meta.load_ts, meta.load_src])?
            }
            VaultRow::OrderHub {
                pk,
                order_id,
                order_dt,
            } => tx.execute(
                "INSERT INTO dds_h_order (h_order_pk, order_id, order_dt, load_ts, load_src)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(h_order_pk) DO NOTHING",
                params![pk, order_id, order_dt, meta.load_ts, meta.load_src],
            )?,
            VaultRow::Link { link, pk, parents } => {
                let [left, right] = link.parent_columns();
                let sql = format!(
                    "INSERT INTO {table} ({key}, {left}, {right}, load_ts, load_src)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT({key}) DO NOTHING",
                    table = link.table(),
                    key = link.key_column(),
                );
                tx.execute(
                    &sql,
                    params![pk, parents[0], parents[1], meta.load_ts, meta.load_src],
                )?
            }
            VaultRow::Satellite {
                satellite,
                parent_pk,
                attributes,
                hashdiff,
            } => {
                if self.mode == SatelliteMode::SkipUnchanged
                    && latest_hashdiff(tx, *satellite, parent_pk)?.as_deref()
                        == Some(hashdiff.as_str())
                {
                    log::debug!("⏭️  [dds] {} unchanged for {}", satellite.table(), parent_pk);
                    return Ok(0);
                }

                let attribute_columns = satellite.attribute_columns();
                let placeholders: Vec<String> = (1..=attribute_columns.len() + 4)
                    .map(|i| format!("?{}", i))
                    .collect();
                let sql = format!(
                    "INSERT INTO {table} ({parent}, {attributes}, load_ts, load_src, {hashdiff})
                     VALUES ({placeholders})",
                    table = satellite.table(),
                    parent = satellite.parent_column(),
                    attributes = attribute_columns.join(", "),
                    hashdiff = satellite.hashdiff_column(),
                    placeholders = placeholders.join(", "),
                );

                let mut values: Vec<SqlValue> = Vec::with_capacity(attributes.len() + 4);
                values.push(SqlValue::Text(parent_pk.clone()));
                values.extend(attributes.iter().map(sql_value));
                values.push(SqlValue::Text(meta.load_ts.clone()));
                values.push(SqlValue::Text(meta.load_src.clone()));
                values.push(SqlValue::Text(hashdiff.clone()));

                tx.execute(&sql, params_from_iter(values))?
            }
        };

        Ok(inserted)
    }
}

fn latest_hashdiff(
    tx: &Transaction<'_>,
    satellite: Satellite,
    parent_pk: &str,
) -> Result<Option<String>, RepositoryError> {
    let sql = format!(
        "SELECT {hashdiff} FROM {table} WHERE {parent} = ?1 ORDER BY id DESC LIMIT 1",
        hashdiff = satellite.hashdiff_column(),
        table = satellite.table(),
        parent = satellite.parent_column(),
    );
    let latest = tx
        .query_row(&sql, params![parent_pk], |row| row.get(0))
        .optional()?;
    Ok(latest)
}

#[async_trait]
impl DdsRepository for SqliteDdsRepository {
    async fn write_order(&self, rows: &[VaultRow], meta: &LoadMeta) -> Result<usize, RepositoryError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        for row in rows {
            inserted += self.write_row(&tx, row, meta)?;
        }

        tx.commit()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count_rows, memory_database};
    use crate::dds::model::{Hub, Link, VaultOrder};
    use crate::keys::surrogate_key;
    use crate::types::{EnrichedOrder, EnrichedProduct, EnrichedUser, NamedEntity};
    use serde_json::json;

    fn meta() -> LoadMeta {
        LoadMeta {
            load_ts: "2024-01-01T12:00:00+00:00".to_string(),
            load_src: "stg-service-orders".to_string(),
        }
    }

    fn rows() -> Vec<VaultRow> {
        let order = EnrichedOrder {
            id: "o1".to_string(),
            date: "2024-01-01".to_string(),
            cost: json!(100),
            payment: json!(100),
            status: "CLOSED".to_string(),
            restaurant: NamedEntity {
                id: Some("r1".to_string()),
                name: "Cafe".to_string(),
            },
            user: EnrichedUser {
                id: Some("u1".to_string()),
                name: "Alice".to_string(),
                login: "alice".to_string(),
            },
            products: vec![EnrichedProduct {
                id: "p1".to_string(),
                price: json!(50),
                quantity: Some(2),
                name: "Burger".to_string(),
                category: "Fastfood".to_string(),
            }],
        };
        VaultOrder::decompose(&order).unwrap().rows
    }

    const SATELLITES: [&str; 5] = [
        "dds_s_user_names",
        "dds_s_restaurant_names",
        "dds_s_product_names",
        "dds_s_order_cost",
        "dds_s_order_status",
    ];

    const HUBS_AND_LINKS: [&str; 9] = [
        "dds_h_user",
        "dds_h_restaurant",
        "dds_h_order",
        "dds_h_product",
        "dds_h_category",
        "dds_l_order_user",
        "dds_l_order_product",
        "dds_l_product_restaurant",
        "dds_l_product_category",
    ];

    #[tokio::test]
    async fn test_write_order_fills_every_table() {
        let conn = memory_database();
        let repo = SqliteDdsRepository::new(conn.clone(), SatelliteMode::AlwaysInsert);

        let inserted = repo.write_order(&rows(), &meta()).await.unwrap();
        assert_eq!(inserted, 14);

        for table in HUBS_AND_LINKS.iter().chain(SATELLITES.iter()) {
            assert_eq!(count_rows(&conn, table), 1, "{}", table);
        }

        let guard = conn.lock().unwrap();
        let (user_id, load_src): (String, String) = guard
            .query_row(
                "SELECT user_id, load_src FROM dds_h_user WHERE h_user_pk = ?1",
                params![surrogate_key("u1")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(user_id, "u1");
        assert_eq!(load_src, "stg-service-orders");

        let cost: i64 = guard
            .query_row("SELECT cost FROM dds_s_order_cost", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cost, 100);
    }

    #[tokio::test]
    async fn test_redelivery_always_insert() {
        let conn = memory_database();
        let repo = SqliteDdsRepository::new(conn.clone(), SatelliteMode::AlwaysInsert);

        repo.write_order(&rows(), &meta()).await.unwrap();
        let inserted = repo.write_order(&rows(), &meta()).await.unwrap();
        assert_eq!(inserted, 5);

        for table in HUBS_AND_LINKS {
            assert_eq!(count_rows(&conn, table), 1, "{}", table);
        }
        for table in SATELLITES {
            assert_eq!(count_rows(&conn, table), 2, "{}", table);
        }
    }

    #[tokio::test]
    async fn test_redelivery_skip_unchanged() {
        let conn = memory_database();
        let repo = SqliteDdsRepository::new(conn.clone(), SatelliteMode::SkipUnchanged);

        repo.write_order(&rows(), &meta()).await.unwrap();
        let inserted = repo.write_order(&rows(), &meta()).await.unwrap();
        assert_eq!(inserted, 0);

        for table in SATELLITES {
            assert_eq!(count_rows(&conn, table), 1, "{}", table);
        }
    }

    #[tokio::test]
    async fn test_skip_unchanged_appends_changed_version() {
        let conn = memory_database();
        let repo = SqliteDdsRepository::new(conn.clone(), SatelliteMode::SkipUnchanged);
        repo.write_order(&rows(), &meta()).await.unwrap();

        let h_user_pk = surrogate_key("u1");
        let renamed = VaultRow::Satellite {
            satellite: Satellite::UserNames,
            parent_pk: h_user_pk.clone(),
            attributes: vec![json!("Alicia"), json!("alice")],
            hashdiff: crate::keys::composite_key(&[&h_user_pk, "Alicia"]),
        };
        let inserted = repo.write_order(&[renamed], &meta()).await.unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(count_rows(&conn, "dds_s_user_names"), 2);
    }

    #[tokio::test]
    async fn test_failed_order_rolls_back() {
        let conn = memory_database();
        let repo = SqliteDdsRepository::new(conn.clone(), SatelliteMode::AlwaysInsert);

        // Link to a hub that was never written violates the foreign key
        let rows = vec![
            VaultRow::Hub {
                hub: Hub::User,
                pk: surrogate_key("u1"),
                business_id: "u1".to_string(),
            },
            VaultRow::Link {
                link: Link::OrderUser,
                pk: "dangling".to_string(),
                parents: [surrogate_key("o-missing"), surrogate_key("u1")],
            },
        ];

        let err = repo.write_order(&rows, &meta()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Database(_)));
        assert_eq!(count_rows(&conn, "dds_h_user"), 0);
    }

    #[test]
    fn test_satellite_mode_parse() {
        assert_eq!(SatelliteMode::parse("always"), Some(SatelliteMode::AlwaysInsert));
        assert_eq!(
            SatelliteMode::parse(" Skip_Unchanged "),
            Some(SatelliteMode::SkipUnchanged)
        );
        assert_eq!(SatelliteMode::parse("sometimes"), None);
        assert_eq!(SatelliteMode::default(), SatelliteMode::AlwaysInsert);
    }
}

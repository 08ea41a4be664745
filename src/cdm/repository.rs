//! Counter mart store
//!
//! Both counters are insert-or-increment. Nothing is deduplicated here: a
//! redelivered fact event is counted again.

use crate::db::{lock, RepositoryError, SharedConnection};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

#[async_trait]
pub trait CdmRepository: Send + Sync {
    /// `cdm_user_product_counters.order_cnt += order_cnt`
    async fn user_product_counters_insert(
        &self,
        user_id: &str,
        product_id: &str,
        product_name: &str,
        order_cnt: i64,
    ) -> Result<(), RepositoryError>;

    /// `cdm_user_category_counters.order_cnt += 1`
    async fn user_category_counters_insert(
        &self,
        user_id: &str,
        category_id: &str,
        category_name: &str,
    ) -> Result<(), RepositoryError>;
}

pub struct SqliteCdmRepository {
    conn: SharedConnection,
}

impl SqliteCdmRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Current product counter, `None` if never incremented
    pub fn product_counter(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        let conn = lock(&self.conn)?;
        let count = conn
            .query_row(
                "SELECT order_cnt FROM cdm_user_product_counters
                 WHERE user_id = ?1 AND product_id = ?2",
                params![user_id, product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    /// Current category counter, `None` if never incremented
    pub fn category_counter(
        &self,
        user_id: &str,
        category_id: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        let conn = lock(&self.conn)?;
        let count = conn
            .query_row(
                "SELECT order_cnt FROM cdm_user_category_counters
                 WHERE user_id = ?1 AND category_id = ?2",
                params![user_id, category_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }
}

#[async_trait]
impl CdmRepository for SqliteCdmRepository {
    async fn user_product_counters_insert(
        &self,
        user_id: &str,
        product_id: &str,
        product_name: &str,
        order_cnt: i64,
    ) -> Result<(), RepositoryError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO cdm_user_product_counters (user_id, product_id, product_name, order_cnt)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, product_id) DO UPDATE
             SET order_cnt = cdm_user_product_counters.order_cnt + excluded.order_cnt",
            params![user_id, product_id, product_name, order_cnt],
        )?;
        Ok(())
    }

    async fn user_category_counters_insert(
        &self,
        user_id: &str,
        category_id: &str,
        category_name: &str,
    ) -> Result<(), RepositoryError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO cdm_user_category_counters (user_id, category_id, category_name, order_cnt)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(user_id, category_id) DO UPDATE
             SET order_cnt = cdm_user_category_counters.order_cnt + 1",
            params![user_id, category_id, category_name],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count_rows, memory_database};

    #[tokio::test]
    async fn test_product_counter_accumulates_quantity() {
        let conn = memory_database();
        let repo = SqliteCdmRepository::new(conn.clone());

        repo.user_product_counters_insert("k1", "p1", "Burger", 2)
            .await
            .unwrap();
        repo.user_product_counters_insert("k1", "p1", "Burger", 3)
            .await
            .unwrap();
        repo.user_product_counters_insert("k2", "p1", "Burger", 1)
            .await
            .unwrap();

        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(5));
        assert_eq!(repo.product_counter("k2", "p1").unwrap(), Some(1));
        assert_eq!(repo.product_counter("k3", "p1").unwrap(), None);
        assert_eq!(count_rows(&conn, "cdm_user_product_counters"), 2);
    }

    #[tokio::test]
    async fn test_category_counter_counts_calls() {
        let conn = memory_database();
        let repo = SqliteCdmRepository::new(conn.clone());

        for _ in 0..3 {
            repo.user_category_counters_insert("k1", "c1", "Fastfood")
                .await
                .unwrap();
        }

        assert_eq!(repo.category_counter("k1", "c1").unwrap(), Some(3));
        assert_eq!(count_rows(&conn, "cdm_user_category_counters"), 1);
    }

    #[tokio::test]
    async fn test_negative_quantity_is_added_as_is() {
        let repo = SqliteCdmRepository::new(memory_database());

        repo.user_product_counters_insert("k1", "p1", "Burger", -1)
            .await
            .unwrap();
        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(-1));

        repo.user_product_counters_insert("k1", "p1", "Burger", 3)
            .await
            .unwrap();
        assert_eq!(repo.product_counter("k1", "p1").unwrap(), Some(2));
    }
}

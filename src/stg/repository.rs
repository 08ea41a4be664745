//! Append-only staging store

use crate::db::{lock, RepositoryError, SharedConnection};
use crate::types::StagingRecord;
use async_trait::async_trait;
use rusqlite::params;

/// Tables written:
/// - `stg_order_events` - INSERT only, one row per received event
#[async_trait]
pub trait StgRepository: Send + Sync {
    async fn order_events_insert(&self, record: &StagingRecord) -> Result<(), RepositoryError>;
}

pub struct SqliteStgRepository {
    conn: SharedConnection,
}

impl SqliteStgRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// All staged copies of one source object, oldest first
    pub fn order_events(&self, object_id: &str) -> Result<Vec<StagingRecord>, RepositoryError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT object_id, object_type, sent_dttm, payload
             FROM stg_order_events
             WHERE object_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![object_id], |row| {
            Ok(StagingRecord {
                object_id: row.get(0)?,
                object_type: row.get(1)?,
                sent_timestamp: row.get(2)?,
                payload_json: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

#[async_trait]
impl StgRepository for SqliteStgRepository {
    async fn order_events_insert(&self, record: &StagingRecord) -> Result<(), RepositoryError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO stg_order_events (object_id, object_type, sent_dttm, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.object_id,
                record.object_type,
                record.sent_timestamp,
                record.payload_json,
            ],
        )?;
        Ok(())
    }
}

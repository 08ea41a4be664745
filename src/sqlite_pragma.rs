//! SQLite PRAGMA tuning applied to every connection the pipeline opens

use rusqlite::Connection;
use std::time::Duration;

/// Apply WAL journaling and the rest of the connection tuning.
///
/// - `journal_mode=WAL` so a reader (ops tooling, tests) never blocks a stage
/// - `synchronous=NORMAL` is durable enough under WAL
/// - `foreign_keys=ON` so vault links/satellites must reference existing hubs
/// - `wal_autocheckpoint=1000` pages
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

//! Reference-entity cache (users, restaurants with menus)
//!
//! [`CacheLookup`] is the only thing the staging stage sees. It turns every
//! failure mode of the backing store (absent key, malformed JSON, non-object
//! JSON, backend error) into an empty [`Entity`], so enrichment branches on
//! emptiness and never on lookup failure.

pub mod backend;
pub mod lookup;
pub mod memory;
pub mod sqlite;

pub use backend::{CacheBackend, CacheError};
pub use lookup::{CacheLookup, Entity};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

//! Staging stage: raw order events -> `stg_order_events` + enriched order events

pub mod processor;
pub mod repository;

pub use processor::StgMessageProcessor;
pub use repository::{SqliteStgRepository, StgRepository};

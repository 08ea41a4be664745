//! Vault stage: enriched orders -> data vault (`dds_*`) + product-fact events

pub mod model;
pub mod processor;
pub mod repository;

pub use model::{DecomposeError, VaultOrder, VaultRow};
pub use processor::DdsMessageProcessor;
pub use repository::{DdsRepository, LoadMeta, SatelliteMode, SqliteDdsRepository};

//! Aggregate stage: product-fact events -> counter marts (`cdm_*`)

pub mod processor;
pub mod repository;

pub use processor::CdmMessageProcessor;
pub use repository::{CdmRepository, SqliteCdmRepository};

//! orderflow: order-lifecycle event pipeline
//!
//! Three stages connected by topics, each persisting to its own table family:
//! - [`stg`] - raw events into staging, enriched from the reference cache
//! - [`dds`] - closed orders into data vault hubs, links and satellites
//! - [`cdm`] - per-order product facts into running counters

pub mod broker;
pub mod cache;
pub mod cdm;
pub mod config;
pub mod db;
pub mod dds;
pub mod keys;
pub mod processor;
pub mod runtime;
pub mod sqlite_pragma;
pub mod stg;
pub mod types;

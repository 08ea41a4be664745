//! Message broker interface
//!
//! Stages talk to the broker only through [`MessageConsumer`] (batched pull,
//! at-least-once) and [`MessageProducer`] (synchronous publish of one JSON
//! document). Two transports are provided:
//!
//! - [`MemoryTopic`] - in-process FIFO queue, used by tests and single-process chaining
//! - [`JsonlConsumer`] / [`JsonlProducer`] - file-backed topic, one JSON document
//!   per line, consumer offsets committed after each successful batch

pub mod backend;
pub mod jsonl;
pub mod memory;

pub use backend::{encode_message, BrokerError, MessageConsumer, MessageProducer};
pub use jsonl::{JsonlConsumer, JsonlProducer};
pub use memory::MemoryTopic;

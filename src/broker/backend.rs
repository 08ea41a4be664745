//! Broker traits and error type

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug)]
pub enum BrokerError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    LockPoisoned(String),
}

impl From<std::io::Error> for BrokerError {
    fn from(err: std::io::Error) -> Self {
        BrokerError::Io(err)
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Io(e) => write!(f, "IO error: {}", e),
            BrokerError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BrokerError::LockPoisoned(topic) => write!(f, "Topic lock poisoned: {}", topic),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Encode an outgoing message; failures belong to the publish path
pub fn encode_message<T: Serialize>(message: &T) -> Result<Value, BrokerError> {
    Ok(serde_json::to_value(message)?)
}

/// Pull side of a topic
#[async_trait]
pub trait MessageConsumer: Send {
    /// Next message, or `None` when the topic currently has nothing to deliver
    async fn consume(&mut self) -> Result<Option<Value>, BrokerError>;

    /// Acknowledge everything consumed so far.
    ///
    /// Called once after a batch finished without error. Messages consumed but not
    /// committed are delivered again to the next consumer of the same group.
    async fn commit(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Drop everything consumed since the last commit so it is delivered again.
    ///
    /// Called after a failed batch. Transports without replay keep the default.
    async fn rewind(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Topic name, also recorded as `load_src` by the vault
    fn topic(&self) -> &str;
}

/// Publish side of a topic
#[async_trait]
pub trait MessageProducer: Send {
    async fn produce(&mut self, message: &Value) -> Result<(), BrokerError>;

    fn topic(&self) -> &str;
}

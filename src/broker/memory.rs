//! In-process topic backed by a shared FIFO queue
//!
//! Clones share the same queue, so one clone can be handed to the producing stage
//! and another to the consuming stage.
//!
//! Consumed messages stay in flight until [`MessageConsumer::commit`];
//! [`MessageConsumer::rewind`] puts them back at the front of the queue in
//! the order they were consumed in.

use super::backend::{BrokerError, MessageConsumer, MessageProducer};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct TopicState {
    queue: VecDeque<Value>,
    in_flight: Vec<Value>,
}

#[derive(Clone)]
pub struct MemoryTopic {
    name: String,
    state: Arc<Mutex<TopicState>>,
}

impl MemoryTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(TopicState::default())),
        }
    }

    /// Topic pre-filled with messages, in delivery order
    pub fn with_messages(name: impl Into<String>, messages: Vec<Value>) -> Self {
        let topic = Self::new(name);
        if let Ok(mut state) = topic.state.lock() {
            state.queue.extend(messages);
        }
        topic
    }

    pub fn push(&self, message: Value) -> Result<(), BrokerError> {
        self.guard()?.queue.push_back(message);
        Ok(())
    }

    /// Number of messages waiting to be consumed, in-flight ones excluded
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every waiting message
    pub fn drain(&self) -> Vec<Value> {
        self.state
            .lock()
            .map(|mut s| s.queue.drain(..).collect())
            .unwrap_or_default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, TopicState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::LockPoisoned(self.name.clone()))
    }
}

#[async_trait]
impl MessageConsumer for MemoryTopic {
    async fn consume(&mut self) -> Result<Option<Value>, BrokerError> {
        let mut state = self.guard()?;
        let message = state.queue.pop_front();
        if let Some(message) = &message {
            state.in_flight.push(message.clone());
        }
        Ok(message)
    }

    async fn commit(&mut self) -> Result<(), BrokerError> {
        self.guard()?.in_flight.clear();
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), BrokerError> {
        let mut state = self.guard()?;
        let in_flight = std::mem::take(&mut state.in_flight);
        for message in in_flight.into_iter().rev() {
            state.queue.push_front(message);
        }
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl MessageProducer for MemoryTopic {
    async fn produce(&mut self, message: &Value) -> Result<(), BrokerError> {
        self.guard()?.queue.push_back(message.clone());
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.name
    }
}

//! Shared batch loop for the three stage processors
//!
//! Every stage runs the same invocation:
//!
//! ```text
//! repeat up to batch_size:
//!     consume ── empty pull ──▶ stop early
//!        │
//!     handle(message) ── malformed / filtered ──▶ Skipped (logged by the stage)
//!        │            ── persistence / broker error ──▶ abort batch, nothing committed
//!        ▼
//!     Processed { published }
//! commit consumer offsets
//! ```
//!
//! There is no retry at this layer. A failed batch is rewound to the last commit
//! and redelivered by the broker on the next invocation.

use crate::broker::{BrokerError, MessageConsumer};
use crate::db::RepositoryError;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug)]
pub enum ProcessorError {
    Broker(BrokerError),
    Repository(RepositoryError),
}

impl From<BrokerError> for ProcessorError {
    fn from(err: BrokerError) -> Self {
        ProcessorError::Broker(err)
    }
}

impl From<RepositoryError> for ProcessorError {
    fn from(err: RepositoryError) -> Self {
        ProcessorError::Repository(err)
    }
}

impl std::fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorError::Broker(e) => write!(f, "Broker error: {}", e),
            ProcessorError::Repository(e) => write!(f, "Repository error: {}", e),
        }
    }
}

impl std::error::Error for ProcessorError {}

/// What a stage did with one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed { published: usize },
    Skipped,
}

/// Counters of one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub processed: usize,
    pub skipped: usize,
    pub published: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Processed { published } => {
                self.processed += 1;
                self.published += published;
            }
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

#[async_trait]
pub trait BatchProcessor: Send {
    /// Stage name for logging (`stg`, `dds`, `cdm`)
    fn stage(&self) -> &'static str;

    fn batch_size(&self) -> usize;

    fn consumer(&mut self) -> &mut dyn MessageConsumer;

    /// Transform, persist and publish one message
    async fn handle(&mut self, message: Value) -> Result<Outcome, ProcessorError>;

    /// Run one bounded batch
    async fn run(&mut self) -> Result<BatchReport, ProcessorError> {
        let stage = self.stage();
        let batch_size = self.batch_size();
        log::info!("🚀 [{}] batch started (up to {} messages)", stage, batch_size);

        let mut report = BatchReport::default();

        for _ in 0..batch_size {
            let message = match self.consumer().consume().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    log::error!(
                        "❌ [{}] consume failed after {} messages: {}",
                        stage,
                        report.received,
                        e
                    );
                    self.consumer().rewind().await?;
                    return Err(e.into());
                }
            };

            log::debug!("📥 [{}] message received", stage);

            match self.handle(message).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    log::error!(
                        "❌ [{}] batch aborted after {} messages: {}",
                        stage,
                        report.received,
                        e
                    );
                    self.consumer().rewind().await?;
                    return Err(e);
                }
            }
        }

        self.consumer().commit().await?;

        log::info!(
            "✅ [{}] batch finished: received={} processed={} skipped={} published={}",
            stage,
            report.received,
            report.processed,
            report.skipped,
            report.published
        );

        Ok(report)
    }
}

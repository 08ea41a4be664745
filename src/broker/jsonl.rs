//! File-backed topic: one JSON document per line
//!
//! Layout inside the topic directory:
//! - `<topic>.jsonl` - the log, appended by [`JsonlProducer`]
//! - `<topic>.<group>.offset` - committed byte offset of consumer group `<group>`
//!
//! The consumer reads from the committed offset and only moves the committed
//! offset forward on [`MessageConsumer::commit`]. A process that dies mid-batch
//! therefore redelivers that batch (at-least-once).

use super::backend::{BrokerError, MessageConsumer, MessageProducer};
use async_trait::async_trait;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub fn topic_path(dir: &Path, topic: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", topic))
}

fn offset_path(dir: &Path, topic: &str, group: &str) -> PathBuf {
    dir.join(format!("{}.{}.offset", topic, group))
}

pub struct JsonlProducer {
    topic: String,
    writer: BufWriter<File>,
}

impl JsonlProducer {
    pub fn open(dir: impl AsRef<Path>, topic: &str) -> Result<Self, BrokerError> {
        fs::create_dir_all(dir.as_ref())?;
        let path = topic_path(dir.as_ref(), topic);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        log::info!("📝 Publishing to topic {} ({})", topic, path.display());

        Ok(Self {
            topic: topic.to_string(),
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl MessageProducer for JsonlProducer {
    async fn produce(&mut self, message: &Value) -> Result<(), BrokerError> {
        let json = serde_json::to_string(message)?;
        writeln!(self.writer, "{}", json)?;
        // Publish is synchronous: the line is on disk before the next message is handled
        self.writer.flush()?;
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

pub struct JsonlConsumer {
    topic: String,
    path: PathBuf,
    offset_path: PathBuf,
    committed: u64,
    position: u64,
    reader: Option<BufReader<File>>,
}

impl JsonlConsumer {
    /// Open a consumer of `topic` for consumer group `group`.
    ///
    /// The log file does not need to exist yet; an absent log is an empty topic.
    pub fn open(dir: impl AsRef<Path>, topic: &str, group: &str) -> Result<Self, BrokerError> {
        fs::create_dir_all(dir.as_ref())?;
        let path = topic_path(dir.as_ref(), topic);
        let offset_path = offset_path(dir.as_ref(), topic, group);

        let committed = match fs::read_to_string(&offset_path) {
            Ok(text) => text.trim().parse::<u64>().unwrap_or_else(|_| {
                log::warn!(
                    "⚠️  Unreadable offset file {}, starting topic {} from the beginning",
                    offset_path.display(),
                    topic
                );
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "📥 Consuming topic {} as group {} from offset {}",
            topic,
            group,
            committed
        );

        Ok(Self {
            topic: topic.to_string(),
            path,
            offset_path,
            committed,
            position: committed,
            reader: None,
        })
    }

    /// Byte offset of the last commit
    pub fn committed_offset(&self) -> u64 {
        self.committed
    }

    fn reader(&mut self) -> Result<Option<&mut BufReader<File>>, BrokerError> {
        if self.reader.is_none() {
            let file = match File::open(&self.path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut reader = BufReader::new(file);
            reader.seek(SeekFrom::Start(self.position))?;
            self.reader = Some(reader);
        }
        Ok(self.reader.as_mut())
    }
}

#[async_trait]
impl MessageConsumer for JsonlConsumer {
    async fn consume(&mut self) -> Result<Option<Value>, BrokerError> {
        loop {
            let position = self.position;
            let Some(reader) = self.reader()? else {
                return Ok(None);
            };

            let mut line = Vec::new();
            let read = reader.read_until(b'\n', &mut line)?;

            if read == 0 {
                return Ok(None);
            }

            if line.last() != Some(&b'\n') {
                // Producer is mid-write; leave the partial line for the next pull
                reader.seek(SeekFrom::Start(position))?;
                return Ok(None);
            }

            self.position += read as u64;

            let text = match std::str::from_utf8(&line) {
                Ok(text) => text.trim(),
                Err(e) => {
                    log::warn!(
                        "⚠️  Skipping non UTF-8 message on {} at offset {}: {}",
                        self.topic,
                        position,
                        e
                    );
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    log::warn!(
                        "⚠️  Skipping undecodable message on {} at offset {}: {}",
                        self.topic,
                        position,
                        e
                    );
                }
            }
        }
    }

    async fn commit(&mut self) -> Result<(), BrokerError> {
        if self.position == self.committed {
            return Ok(());
        }

        let tmp_path = self.offset_path.with_extension("offset.tmp");
        fs::write(&tmp_path, self.position.to_string())?;
        fs::rename(&tmp_path, &self.offset_path)?;
        self.committed = self.position;

        log::debug!("✅ Committed {} at offset {}", self.topic, self.committed);
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), BrokerError> {
        if self.position != self.committed {
            log::debug!(
                "↩️  Rewinding {} from offset {} to {}",
                self.topic,
                self.position,
                self.committed
            );
            self.position = self.committed;
            self.reader = None;
        }
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_produce_then_consume() {
        let dir = tempdir().unwrap();
        let mut producer = JsonlProducer::open(dir.path(), "orders").unwrap();
        producer.produce(&json!({"object_id": 1})).await.unwrap();
        producer.produce(&json!({"object_id": 2})).await.unwrap();

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"object_id": 1})));
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"object_id": 2})));
        assert_eq!(consumer.consume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_topic_is_empty() {
        let dir = tempdir().unwrap();
        let mut consumer = JsonlConsumer::open(dir.path(), "nothing", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uncommitted_messages_are_redelivered() {
        let dir = tempdir().unwrap();
        let mut producer = JsonlProducer::open(dir.path(), "orders").unwrap();
        for i in 0..3 {
            producer.produce(&json!({ "n": i })).await.unwrap();
        }

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        consumer.consume().await.unwrap();
        consumer.commit().await.unwrap();
        consumer.consume().await.unwrap();
        drop(consumer); // crash before second commit

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 1})));

        // Other groups keep their own offsets
        let mut other = JsonlConsumer::open(dir.path(), "orders", "audit").unwrap();
        assert_eq!(other.committed_offset(), 0);
        assert_eq!(other.consume().await.unwrap(), Some(json!({"n": 0})));
    }

    #[tokio::test]
    async fn test_rewind_replays_uncommitted() {
        let dir = tempdir().unwrap();
        let mut producer = JsonlProducer::open(dir.path(), "orders").unwrap();
        for i in 0..3 {
            producer.produce(&json!({ "n": i })).await.unwrap();
        }

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        consumer.consume().await.unwrap();
        consumer.commit().await.unwrap();
        consumer.consume().await.unwrap();
        consumer.consume().await.unwrap();

        consumer.rewind().await.unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_skips_undecodable_and_partial_lines() {
        let dir = tempdir().unwrap();
        let path = topic_path(dir.path(), "orders");
        fs::write(&path, "not json\n\n{\"n\":1}\n{\"n\":").unwrap();

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 1})));
        // Trailing line has no newline yet
        assert_eq!(consumer.consume().await.unwrap(), None);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"2}\n").unwrap();
        drop(file);

        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_offsets_aligned() {
        let dir = tempdir().unwrap();
        let path = topic_path(dir.path(), "orders");
        let mut bytes = b"{\"n\":0}\n".to_vec();
        bytes.extend_from_slice(b"{\"n\":\xff}\n");
        bytes.extend_from_slice(b"{\"n\":1}\n{\"n\":2}\n");
        fs::write(&path, &bytes).unwrap();

        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 0})));
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 1})));
        consumer.commit().await.unwrap();

        // Offset sits right after the `{"n":1}` line
        let after_n1 = (bytes.len() - b"{\"n\":2}\n".len()) as u64;
        assert_eq!(consumer.committed_offset(), after_n1);

        drop(consumer);
        let mut consumer = JsonlConsumer::open(dir.path(), "orders", "stg").unwrap();
        assert_eq!(consumer.consume().await.unwrap(), Some(json!({"n": 2})));
        assert_eq!(consumer.consume().await.unwrap(), None);
    }
}

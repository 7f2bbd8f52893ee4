use crate::kafka::{PartitionKey, RecordFormat};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Last pipeline stage: hands a serialized record to its destination.
///
/// Implementations own the underlying resource. `close` releases it after
/// flushing anything buffered and is safe to call more than once.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, payload: Bytes, key: Option<PartitionKey>) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Writes each record as one JSON line to a local file.
///
/// Useful for running the bot without a broker; records are decoded with
/// the configured format so the output is readable.
pub struct FileSender {
    path: PathBuf,
    format: RecordFormat,
    file: Mutex<Option<File>>,
}

impl FileSender {
    pub async fn create(path: impl AsRef<Path>, format: RecordFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = ?path, "writing records to file");

        Ok(Self {
            path,
            format,
            file: Mutex::new(Some(file)),
        })
    }
}

#[async_trait]
impl Sender for FileSender {
    async fn send(&self, payload: Bytes, key: Option<PartitionKey>) -> Result<()> {
        let record = self.format.decode(&payload)?;
        let line = json!({
            "key": key.as_ref().map(PartitionKey::as_str),
            "record": record,
        });
        let mut line = serde_json::to_vec(&line)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(Error::SenderClosed)?;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush().await?;
            file.sync_all().await?;
            debug!(path = ?self.path, "record file closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_utils::text_event;
    use crate::pipeline::RecordHandler;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sender_writes_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.jsonl");
        let sender = FileSender::create(&path, RecordFormat::Protobuf).await.unwrap();
        let handler = RecordHandler::text(RecordFormat::Protobuf);

        for (i, text) in ["first", "second"].iter().enumerate() {
            let (bytes, key) = handler.handle(&text_event(i as u32, 5, text)).unwrap();
            sender.send(bytes, key).await.unwrap();
        }
        let (bytes, _) = handler.handle(&text_event(3, 5, "keyed")).unwrap();
        sender.send(bytes, Some(PartitionKey::new("chat-5"))).await.unwrap();
        sender.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0]["key"].is_null());
        assert_eq!(lines[0]["record"]["type"], "text");
        assert_eq!(lines[1]["record"]["user_id"], 5);
        assert_eq!(lines[2]["key"], "chat-5");
    }

    #[tokio::test]
    async fn test_send_after_close_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let sender = FileSender::create(temp_dir.path().join("r.jsonl"), RecordFormat::Json)
            .await
            .unwrap();
        sender.close().await.unwrap();
        sender.close().await.unwrap();

        let handler = RecordHandler::text(RecordFormat::Json);
        let (bytes, _) = handler.handle(&text_event(1, 1, "late")).unwrap();
        assert!(matches!(sender.send(bytes, None).await, Err(Error::SenderClosed)));
    }
}

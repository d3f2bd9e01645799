//! Event channel adapters.
//!
//! An [`EventSource`] hands out one subscription per call: a channel of raw
//! JSON payloads. Dropping the receiver releases the subscription.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

const SOCKET_BUFFER: usize = 256;

pub trait EventSource: Send + Sync + 'static {
    fn subscribe(&self) -> Result<mpsc::Receiver<Value>>;
}

/// Reads newline-delimited JSON events from a local push-relay socket
pub struct SocketEventSource {
    socket_path: PathBuf,
}

impl SocketEventSource {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl EventSource for SocketEventSource {
    /// Must be called from within a tokio runtime
    fn subscribe(&self) -> Result<mpsc::Receiver<Value>> {
        if !self.socket_path.exists() {
            anyhow::bail!("Event socket not found at {}", self.socket_path.display());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .context("Event socket subscription requires a tokio runtime")?;

        let (event_tx, event_rx) = mpsc::channel(SOCKET_BUFFER);
        let socket_path = self.socket_path.clone();

        runtime.spawn(async move {
            match UnixStream::connect(&socket_path).await {
                Ok(stream) => {
                    tracing::debug!(path = %socket_path.display(), "connected to event socket");
                    if let Err(e) = read_stream(stream, &event_tx).await {
                        tracing::warn!(error = %e, "event socket read error");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %socket_path.display(), "failed to connect to event socket");
                }
            }
            // event_tx drops here; the subscriber sees the channel close
        });

        Ok(event_rx)
    }
}

async fn read_stream(stream: UnixStream, event_tx: &mpsc::Sender<Value>) -> Result<(), std::io::Error> {
    let reader = BufReader::new(stream);
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = event_tx.closed() => {
                tracing::debug!("event subscriber dropped");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::info!("event socket disconnected");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(&line) {
            Ok(event) => {
                if event_tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse event line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_socket_events_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let source = SocketEventSource::new(&path);
        let mut rx = source.subscribe().unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"{\"type\":\"unread_updated\"}\n\nnot json\n{\"type\":\"message_created\"}\n")
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first["type"], "unread_updated");
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second["type"], "message_created");

        drop(stream);
        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_missing_socket_fails_to_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let source = SocketEventSource::new(dir.path().join("absent.sock"));
        assert!(source.subscribe().is_err());
    }
}

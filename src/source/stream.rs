//! Stream-based reading source.
//!
//! Receives reading payloads from an async byte stream, such as a TCP
//! connection to the realtime backend.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use super::payload::decode_reading;
use super::ReadingSource;
use crate::data::Reading;

/// Buffered readings between the reader task and `poll()`.
const CHANNEL_CAPACITY: usize = 64;

/// A reading source fed by newline-delimited JSON.
///
/// A background task decodes each line into a [`Reading`]. Lines that fail
/// to decode are skipped and recorded as the source's last error.
///
/// ```
/// use std::io::Cursor;
/// use hivewatch::StreamSource;
///
/// # tokio_test::block_on(async {
/// let data = br#"{"temperature":24.5,"humidity":68,"airPurity":85}"#.to_vec();
/// let source = StreamSource::spawn(Cursor::new(data), "example");
/// # });
/// ```
#[derive(Debug)]
pub struct StreamSource {
    receiver: mpsc::Receiver<Reading>,
    description: String,
    last_error: Arc<Mutex<Option<String>>>,
}

impl StreamSource {
    /// Spawn a background task that reads payload lines from `reader`.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let last_error = Arc::new(Mutex::new(None));
        let error_handle = last_error.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        *error_handle.lock() = Some("Connection closed".to_string());
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if !forward(trimmed.as_bytes(), &tx, &error_handle).await {
                            break;
                        }
                    }
                    Err(e) => {
                        *error_handle.lock() = Some(format!("Read error: {}", e));
                        break;
                    }
                }
            }
        });

        Self {
            receiver: rx,
            description: format!("stream: {}", description),
            last_error,
        }
    }

    /// Create a source from a channel of raw payloads.
    ///
    /// Useful when payloads arrive from another transport already framed.
    pub fn from_bytes_channel(mut rx: mpsc::Receiver<Vec<u8>>, description: &str) -> Self {
        let (tx, reading_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let last_error = Arc::new(Mutex::new(None));
        let error_handle = last_error.clone();

        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if !forward(&bytes, &tx, &error_handle).await {
                    break;
                }
            }
        });

        Self {
            receiver: reading_rx,
            description: format!("stream: {}", description),
            last_error,
        }
    }
}

/// Decode one payload and pass it on. Returns false once the source is gone.
async fn forward(
    bytes: &[u8],
    tx: &mpsc::Sender<Reading>,
    last_error: &Mutex<Option<String>>,
) -> bool {
    match decode_reading(bytes) {
        Ok(reading) => {
            *last_error.lock() = None;
            tx.send(reading).await.is_ok()
        }
        Err(e) => {
            warn!("Skipping reading payload: {}", e);
            *last_error.lock() = Some(format!("Parse error: {}", e));
            true
        }
    }
}

impl ReadingSource for StreamSource {
    fn poll(&mut self) -> Option<Reading> {
        match self.receiver.try_recv() {
            Ok(reading) => Some(reading),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                let mut last_error = self.last_error.lock();
                if last_error.is_none() {
                    *last_error = Some("Stream disconnected".to_string());
                }
                None
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

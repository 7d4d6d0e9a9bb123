//! Inbound data sources.
//!
//! Live readings and historical sets reach the engine through two traits,
//! [`ReadingSource`] and [`HistorySource`]. Which implementations back them
//! is decided once at startup by [`Backend`]: a live transport, or the
//! deterministic fixtures used for demos and tests.

mod channel;
mod file;
mod fixture;
pub mod payload;
mod stream;

pub use channel::ChannelSource;
pub use file::FileSource;
pub use fixture::{FixtureHistory, FixtureSource};
pub use stream::StreamSource;

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::info;

use crate::config::BackendSettings;
use crate::data::{HistoricalSet, Reading};
use crate::feed::Clock;

/// Trait for receiving live readings.
///
/// # Example
///
/// ```
/// use hivewatch::{ChannelSource, ReadingSource, Reading};
///
/// let (tx, mut source) = ChannelSource::create("in-process");
/// tx.send(Reading::new(24.5, 68.0, 85.0)).unwrap();
/// assert!(source.poll().is_some());
/// ```
pub trait ReadingSource: Send + Debug {
    /// Poll for the next reading.
    ///
    /// Returns `Some(reading)` if one is available, `None` otherwise.
    /// This method must not block.
    fn poll(&mut self) -> Option<Reading>;

    /// Human-readable description of the source.
    fn description(&self) -> &str;

    /// The error from the last poll, if any.
    fn error(&self) -> Option<String>;
}

/// Trait for fetching the historical set.
pub trait HistorySource: Send + Debug {
    /// Fetch the current historical set.
    ///
    /// Returns `None` when the set cannot be obtained (IO or parse failure).
    fn fetch(&mut self) -> Option<HistoricalSet>;

    fn description(&self) -> &str;
}

/// Which family of sources feeds the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A network stream for readings and a JSON file for history.
    #[default]
    Live,
    /// Generated demo data.
    Fixture,
}

/// The source pair a backend opens into.
pub type SourcePair = (Box<dyn ReadingSource>, Box<dyn HistorySource>);

impl Backend {
    /// Open the sources for this backend. Must be called from within a
    /// tokio runtime.
    pub async fn open(
        self,
        settings: &BackendSettings,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<SourcePair> {
        match self {
            Backend::Fixture => {
                info!("Using fixture backend");
                Ok((
                    Box::new(FixtureSource::new(clock.clone())),
                    Box::new(FixtureHistory::new(clock)),
                ))
            }
            Backend::Live => {
                let addr = settings
                    .connect
                    .as_deref()
                    .context("live backend needs backend.connect (or --connect)")?;
                let stream = TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("Failed to connect to {}", addr))?;
                info!("Connected to reading stream at {}", addr);

                let history: Box<dyn HistorySource> = match &settings.history_file {
                    Some(path) => Box::new(FileSource::new(path)),
                    None => Box::new(FileSource::empty()),
                };
                Ok((Box::new(StreamSource::spawn(stream, addr)), history))
            }
        }
    }
}

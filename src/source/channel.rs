//! Channel-based reading source.
//!
//! Receives already-decoded readings in-process, for embedding the engine
//! next to a producer that speaks its own transport.

use tokio::sync::mpsc;

use super::ReadingSource;
use crate::data::Reading;

/// A reading source fed through an in-process channel.
///
/// Unlike a watch channel every reading sent is delivered, in order.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Reading>,
    description: String,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::UnboundedReceiver<Reading>, source_description: &str) -> Self {
        Self {
            receiver,
            description: format!("channel: {}", source_description),
            disconnected: false,
        }
    }

    /// Create a sender and the source it feeds.
    pub fn create(source_description: &str) -> (mpsc::UnboundedSender<Reading>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx, source_description))
    }
}

impl ReadingSource for ChannelSource {
    fn poll(&mut self) -> Option<Reading> {
        match self.receiver.try_recv() {
            Ok(reading) => Some(reading),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.disconnected = true;
                None
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<String> {
        self.disconnected.then(|| "Channel closed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_poll() {
        let (tx, mut source) = ChannelSource::create("test");
        assert_eq!(source.description(), "channel: test");
        assert!(source.poll().is_none());

        tx.send(Reading::new(24.5, 68.0, 85.0)).unwrap();
        tx.send(Reading::new(26.2, 72.0, 78.0)).unwrap();

        assert_eq!(source.poll().unwrap().temperature, 24.5);
        assert_eq!(source.poll().unwrap().temperature, 26.2);
        assert!(source.poll().is_none());
        assert!(source.error().is_none());
    }

    #[test]
    fn test_channel_source_reports_closed_sender() {
        let (tx, mut source) = ChannelSource::create("test");
        tx.send(Reading::new(24.5, 68.0, 85.0)).unwrap();
        drop(tx);

        assert!(source.poll().is_some());
        assert!(source.poll().is_none());
        assert_eq!(source.error().as_deref(), Some("Channel closed"));
    }
}

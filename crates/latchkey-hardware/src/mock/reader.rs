//! Mock tag reader implementation for testing and development.
//!
//! This module provides a simulated reader that can be fed tags and read
//! failures programmatically without requiring physical hardware.

use crate::{
    HardwareError, Result,
    traits::TagReader,
    types::{DeviceInfo, TagData},
};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mock tag reader for testing and development.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::MockTagReader;
/// use latchkey_hardware::traits::TagReader;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (mut reader, handle) = MockTagReader::new();
///
///     handle.present_tag(vec![0x04, 0xA1, 0xB2, 0xC3]).await?;
///
///     let tag = reader.poll_for_tag(Duration::from_millis(100)).await?;
///     assert_eq!(tag.unwrap().uid_hex(), "04a1b2c3");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTagReader {
    /// Channel receiver for reader events
    event_rx: mpsc::Receiver<ReaderEvent>,

    /// Device name
    name: String,
}

impl MockTagReader {
    /// Create a new mock reader with the default name.
    ///
    /// Returns a tuple of (MockTagReader, MockTagReaderHandle) where the handle
    /// can be used to simulate tag presentations and read errors.
    pub fn new() -> (Self, MockTagReaderHandle) {
        Self::with_name("Mock PN532")
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockTagReaderHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);

        let reader = Self {
            event_rx,
            name: name.into(),
        };

        (reader, MockTagReaderHandle { event_tx })
    }
}

impl TagReader for MockTagReader {
    async fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<TagData>> {
        match tokio::time::timeout(timeout, self.event_rx.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(HardwareError::disconnected("tag reader event channel closed")),
            Ok(Some(ReaderEvent::Tag(uid))) => TagData::new(uid).map(Some),
            Ok(Some(ReaderEvent::Fault(message))) => Err(HardwareError::tag_read(message)),
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "Mock ISO14443A Reader")
            .with_firmware_version("1.6"))
    }
}

/// Internal event type for the mock reader.
#[derive(Debug, Clone)]
enum ReaderEvent {
    Tag(Vec<u8>),
    Fault(String),
}

/// Handle for controlling a mock tag reader.
///
/// Events are delivered to the reader in the order they are queued.
#[derive(Debug, Clone)]
pub struct MockTagReaderHandle {
    event_tx: mpsc::Sender<ReaderEvent>,
}

impl MockTagReaderHandle {
    /// Queue a tag presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader has been dropped.
    pub async fn present_tag(&self, uid: Vec<u8>) -> Result<()> {
        self.send(ReaderEvent::Tag(uid)).await
    }

    /// Queue a read failure, e.g. a corrupted frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader has been dropped.
    pub async fn inject_fault(&self, message: impl Into<String>) -> Result<()> {
        self.send(ReaderEvent::Fault(message.into())).await
    }

    async fn send(&self, event: ReaderEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("tag reader event channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reader_present_and_read() {
        let (mut reader, handle) = MockTagReader::new();
        handle.present_tag(vec![0x04, 0xA1, 0xB2, 0xC3]).await.unwrap();

        let tag = reader
            .poll_for_tag(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag.uid_hex(), "04a1b2c3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_reader_times_out_without_tag() {
        let (mut reader, _handle) = MockTagReader::new();
        let tag = reader.poll_for_tag(Duration::from_millis(100)).await.unwrap();
        assert!(tag.is_none());
    }

    #[tokio::test]
    async fn test_mock_reader_injected_fault() {
        let (mut reader, handle) = MockTagReader::new();
        handle.inject_fault("frame checksum mismatch").await.unwrap();

        let err = reader
            .poll_for_tag(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, HardwareError::TagReadError { .. }));
    }

    #[tokio::test]
    async fn test_mock_reader_rejects_short_uid() {
        let (mut reader, handle) = MockTagReader::new();
        handle.present_tag(vec![0x01]).await.unwrap();

        let err = reader
            .poll_for_tag(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, HardwareError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_mock_reader_disconnected_when_handle_dropped() {
        let (mut reader, handle) = MockTagReader::new();
        drop(handle);

        let err = reader
            .poll_for_tag(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_mock_reader_events_in_order() {
        let (mut reader, handle) = MockTagReader::new();
        handle.present_tag(vec![0x01, 0x02, 0x03, 0x04]).await.unwrap();
        handle.inject_fault("noise").await.unwrap();
        handle.present_tag(vec![0x05, 0x06, 0x07, 0x08]).await.unwrap();

        let timeout = Duration::from_millis(100);
        assert_eq!(
            reader.poll_for_tag(timeout).await.unwrap().unwrap().uid_hex(),
            "01020304"
        );
        assert!(reader.poll_for_tag(timeout).await.is_err());
        assert_eq!(
            reader.poll_for_tag(timeout).await.unwrap().unwrap().uid_hex(),
            "05060708"
        );
    }

    #[tokio::test]
    async fn test_mock_reader_info() {
        let (reader, _handle) = MockTagReader::with_name("Front Door");
        let info = reader.get_info().await.unwrap();
        assert_eq!(info.name, "Front Door");
    }
}

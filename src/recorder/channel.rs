//! Chunked recorder trait
//!
//! Defines the interface for recorders that turn a live stream into encoded
//! chunks, delivered over an event channel.

use crate::capture::traits::LiveStream;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while setting up a recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Stream {0} carries no encoded media")]
    NoMedia(String),

    #[error("Unsupported container: {0}")]
    UnsupportedContainer(String),

    #[error("Recorder already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Notifications a recorder sends while it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Data buffered since the previous notification, possibly empty
    DataAvailable(Vec<u8>),
    /// The recorder will not send anything else
    Stopped,
}

/// Sending half of a recorder's notification channel
pub type RecorderEventSender = mpsc::UnboundedSender<RecorderEvent>;

/// Trait for chunked recorders
///
/// A recorder is bound to one stream. After `start` it sends
/// `DataAvailable` every interval and exactly one `Stopped` at the end.
pub trait ChunkedRecorder: Send {
    /// MIME type of the produced chunks (e.g. "video/webm")
    fn mime_type(&self) -> &str;

    /// Start emitting chunks every `interval`
    fn start(&mut self, interval: Duration, events: RecorderEventSender) -> RecorderResult<()>;

    /// Stop recording; buffered data is flushed before `Stopped`
    fn stop(&mut self);

    /// Check if the recorder is currently running
    fn is_recording(&self) -> bool;
}

/// Builds recorders bound to live streams
pub trait RecorderFactory: Send + Sync {
    fn create(
        &self,
        stream: &mut dyn LiveStream,
        mime_type: &str,
    ) -> RecorderResult<Box<dyn ChunkedRecorder>>;
}

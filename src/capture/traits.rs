//! Capture trait definitions
//!
//! Platform-agnostic interface to the screen-capture source and the live
//! streams it hands out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

/// Whether the pointer is drawn into the captured video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorVisibility {
    /// Always draw the cursor
    Always,
    /// Only draw the cursor while it moves (falls back to `Always` where unsupported)
    Motion,
    /// Never draw the cursor
    Never,
}

impl Default for CursorVisibility {
    fn default() -> Self {
        Self::Always
    }
}

/// Video part of a capture request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConstraints {
    pub cursor: CursorVisibility,
}

/// What to ask the capture source for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConstraints {
    pub video: VideoConstraints,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video: VideoConstraints::default(),
            audio: true,
        }
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Information about one track of a live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Track identifier, unique within the stream
    pub id: String,

    /// Video or audio
    pub kind: TrackKind,

    /// Human-readable label (e.g. the grabber or device name)
    pub label: String,
}

/// Encoded media produced by a live stream.
///
/// `prefix` holds bytes the source already consumed from `reader` while
/// bringing the stream up; they come before anything read afterwards.
pub struct MediaPipe {
    pub prefix: Vec<u8>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for MediaPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPipe")
            .field("prefix_len", &self.prefix.len())
            .finish_non_exhaustive()
    }
}

/// A live audio/video stream handed out by a [`ScreenCaptureSource`].
///
/// The stream is owned exclusively by whoever holds it. Dropping it without
/// calling [`LiveStream::stop_tracks`] must still release the capture.
pub trait LiveStream: Send {
    /// Stream identifier
    fn id(&self) -> &str;

    /// Tracks carried by this stream
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Termination signal, fired once when the stream ends for any reason.
    ///
    /// Can only be taken once; later calls return `None`.
    fn take_ended_signal(&mut self) -> Option<oneshot::Receiver<()>>;

    /// Hand the encoded media over to a recorder, if this stream carries any
    fn take_media(&mut self) -> Option<MediaPipe>;

    /// Stop every track, releasing the display/microphone
    fn stop_tracks(&mut self);
}

/// Errors the capture source reports for a request
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Capture failed: {0}")]
    Other(String),
}

impl CaptureError {
    /// Collapse the error into the user-facing taxonomy
    pub fn kind(&self) -> CaptureErrorKind {
        match self {
            CaptureError::PermissionDenied(_) => CaptureErrorKind::PermissionDenied,
            CaptureError::NotSupported(_) => CaptureErrorKind::NotSupported,
            CaptureError::Other(detail) => CaptureErrorKind::Unknown(detail.clone()),
        }
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Failure cases surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CaptureErrorKind {
    /// No permission granted, or the user canceled the picker
    PermissionDenied,
    /// Screen capture is unavailable in this environment
    NotSupported,
    /// Anything else, with diagnostic detail
    Unknown(String),
}

impl CaptureErrorKind {
    /// Message shown inline next to the start/stop control
    pub fn user_message(&self) -> String {
        match self {
            CaptureErrorKind::PermissionDenied => {
                "No permission to record your screen and audio, or you canceled the recording."
                    .to_string()
            }
            CaptureErrorKind::NotSupported => {
                "Screen recording is not supported in this environment yet.".to_string()
            }
            CaptureErrorKind::Unknown(detail) => format!("Error: {}", detail),
        }
    }
}

/// Source of live screen streams
#[async_trait]
pub trait ScreenCaptureSource: Send + Sync {
    /// Source identifier (e.g. "ffmpeg")
    fn id(&self) -> &str;

    /// Whether screen capture is available at all in this environment
    async fn is_supported(&self) -> bool;

    /// Ask for a live stream. Resolves once the user granted or refused.
    async fn request_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> CaptureResult<Box<dyn LiveStream>>;
}

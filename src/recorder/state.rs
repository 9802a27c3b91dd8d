//! Capture state management
//!
//! Defines the capture state machine, the session record and the recorder
//! configuration.

use super::artifact::ArtifactRef;
use crate::capture::traits::{CaptureConstraints, CaptureErrorKind};
use crate::utils::error::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Current state of the capture controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CaptureState {
    /// Nothing captured yet, or torn down
    Idle,
    /// Waiting for the capture source to grant or refuse a stream
    RequestingPermission,
    /// Chunks are being collected
    Recording,
    /// Recording completed, artifact ready for download
    #[serde(rename_all = "camelCase")]
    Finished { artifact: ArtifactRef },
    /// The capture request failed; behaves like `Idle` for the next start
    #[serde(rename_all = "camelCase")]
    Failed { error: CaptureErrorKind },
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::Idle
    }
}

impl CaptureState {
    /// Whether a session currently owns the capture source
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::RequestingPermission | CaptureState::Recording)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, CaptureState::Recording)
    }
}

/// Why a recording session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    /// The user pressed stop
    UserStopped,
    /// The capture source ended the stream (e.g. sharing revoked from the OS)
    SourceEnded,
    /// The recorder stopped on its own, usually because its input ran dry
    RecorderStopped,
}

/// Phase of a single capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    RequestingPermission,
    Recording,
    Finished,
    Failed,
}

/// One recording attempt and the chunks it collected
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    /// Session identifier
    pub id: Uuid,

    /// Where the session is in its lifecycle
    pub phase: SessionPhase,

    /// Encoded chunks in receipt order
    #[serde(skip)]
    chunks: Vec<Vec<u8>>,

    /// Bytes collected so far
    pub total_bytes: usize,

    /// When the start intent created the session
    pub started_at: DateTime<Utc>,

    /// When the session finished or failed
    pub ended_at: Option<DateTime<Utc>>,

    /// Set once the session is finished
    pub finish_reason: Option<FinishReason>,

    /// Set when the capture request failed
    pub last_error: Option<CaptureErrorKind>,
}

impl CaptureSession {
    /// Create a session that is waiting for the capture source
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: SessionPhase::RequestingPermission,
            chunks: Vec::new(),
            total_bytes: 0,
            started_at: Utc::now(),
            ended_at: None,
            finish_reason: None,
            last_error: None,
        }
    }

    /// Chunks collected so far, in receipt order
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes collected after the first `offset` bytes, for following a recording live
    pub fn bytes_since(&self, offset: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes.saturating_sub(offset));
        let mut start = 0;
        for chunk in &self.chunks {
            let end = start + chunk.len();
            if end > offset {
                out.extend_from_slice(&chunk[offset.saturating_sub(start)..]);
            }
            start = end;
        }
        out
    }

    /// Move into the recording phase
    pub fn begin_recording(&mut self) {
        self.phase = SessionPhase::Recording;
    }

    /// Append a chunk. Returns false if the chunk was discarded, either because
    /// it is empty or because the session no longer records.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> bool {
        if self.phase != SessionPhase::Recording || chunk.is_empty() {
            return false;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
        true
    }

    /// Freeze the session and return the concatenated recording
    pub fn finish(&mut self, reason: FinishReason) -> Vec<u8> {
        self.phase = SessionPhase::Finished;
        self.finish_reason = Some(reason);
        self.ended_at = Some(Utc::now());
        self.chunks.concat()
    }

    /// Mark the capture request as failed
    pub fn fail(&mut self, error: CaptureErrorKind) {
        self.phase = SessionPhase::Failed;
        self.last_error = Some(error);
        self.ended_at = Some(Utc::now());
    }

    /// Duration in milliseconds, up to now for running sessions
    pub fn duration_ms(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Container the recorder muxes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaContainer {
    WebM,
    Mp4,
}

impl Default for MediaContainer {
    fn default() -> Self {
        Self::WebM
    }
}

impl MediaContainer {
    /// MIME type the artifact is tagged with
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaContainer::WebM => "video/webm",
            MediaContainer::Mp4 => "video/mp4",
        }
    }

    /// MIME type with codecs, as needed to feed a streaming player
    pub fn stream_mime_type(&self, has_audio: bool) -> String {
        let codecs = match (self, has_audio) {
            (MediaContainer::WebM, true) => "vp8, opus",
            (MediaContainer::WebM, false) => "vp8",
            (MediaContainer::Mp4, true) => "avc1.640028, mp4a.40.2",
            (MediaContainer::Mp4, false) => "avc1.640028",
        };
        format!("{}; codecs=\"{}\"", self.mime_type(), codecs)
    }

    /// File extension for saved recordings
    pub fn extension(&self) -> &'static str {
        match self {
            MediaContainer::WebM => "webm",
            MediaContainer::Mp4 => "mp4",
        }
    }

    /// Short name used in the download label
    pub fn label(&self) -> &'static str {
        match self {
            MediaContainer::WebM => "WebM",
            MediaContainer::Mp4 => "MP4",
        }
    }

    /// Look up a container by MIME type, ignoring codec parameters
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "video/webm" => Some(MediaContainer::WebM),
            "video/mp4" => Some(MediaContainer::Mp4),
            _ => None,
        }
    }
}

/// Configuration for the capture controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Container the recorder produces
    pub container: MediaContainer,

    /// How often the recorder emits buffered data, in milliseconds
    pub chunk_interval_ms: u64,

    /// Suggested file name without extension
    pub file_stem: String,

    /// What to request from the capture source
    pub constraints: CaptureConstraints,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            container: MediaContainer::WebM,
            chunk_interval_ms: 10,
            file_stem: "screenrecording".to_string(),
            constraints: CaptureConstraints::default(),
        }
    }
}

impl RecorderConfig {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.max(1))
    }

    /// Suggested download file name, e.g. `screenrecording.webm`
    pub fn suggested_file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.container.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ignores_empty_and_late_chunks() {
        let mut session = CaptureSession::new();
        assert!(!session.push_chunk(vec![1, 2, 3]), "not recording yet");

        session.begin_recording();
        assert!(session.push_chunk(vec![1; 10]));
        assert!(!session.push_chunk(Vec::new()));
        assert!(session.push_chunk(vec![2; 20]));
        assert_eq!(session.chunk_count(), 2);
        assert_eq!(session.total_bytes, 30);

        let bytes = session.finish(FinishReason::UserStopped);
        assert_eq!(bytes.len(), 30);
        assert_eq!(&bytes[..10], &[1u8; 10]);
        assert_eq!(&bytes[10..], &[2u8; 20]);

        assert!(!session.push_chunk(vec![9; 5]));
        assert_eq!(session.chunk_count(), 2);
        assert_eq!(session.finish_reason, Some(FinishReason::UserStopped));
        assert!(session.duration_ms() >= 0);
    }

    #[test]
    fn test_bytes_since_offset() {
        let mut session = CaptureSession::new();
        session.begin_recording();
        session.push_chunk(b"abc".to_vec());
        session.push_chunk(b"defg".to_vec());

        assert_eq!(session.bytes_since(0), b"abcdefg");
        assert_eq!(session.bytes_since(2), b"cdefg");
        assert_eq!(session.bytes_since(3), b"defg");
        assert!(session.bytes_since(7).is_empty());
        assert!(session.bytes_since(100).is_empty());
    }

    #[test]
    fn test_container_lookup() {
        assert_eq!(MediaContainer::from_mime("video/webm"), Some(MediaContainer::WebM));
        assert_eq!(
            MediaContainer::from_mime("video/webm;codecs=vp8,opus"),
            Some(MediaContainer::WebM)
        );
        assert_eq!(MediaContainer::from_mime("VIDEO/MP4"), Some(MediaContainer::Mp4));
        assert_eq!(MediaContainer::from_mime("audio/ogg"), None);

        let streamed = MediaContainer::WebM.stream_mime_type(true);
        assert_eq!(streamed, "video/webm; codecs=\"vp8, opus\"");
        assert_eq!(MediaContainer::from_mime(&streamed), Some(MediaContainer::WebM));
    }

    #[test]
    fn test_config_defaults() {
        let config: RecorderConfig = serde_json::from_str(r#"{"fileStem":"demo"}"#).unwrap();
        assert_eq!(config.container, MediaContainer::WebM);
        assert_eq!(config.chunk_interval(), Duration::from_millis(10));
        assert_eq!(config.suggested_file_name(), "demo.webm");
        assert_eq!(RecorderConfig::default().suggested_file_name(), "screenrecording.webm");
    }

    #[test]
    fn test_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{"container":"mp4","chunkIntervalMs":250}"#).unwrap();

        let config = RecorderConfig::load(&path).unwrap();
        assert_eq!(config.container, MediaContainer::Mp4);
        assert_eq!(config.chunk_interval(), Duration::from_millis(250));
        assert_eq!(config.suggested_file_name(), "screenrecording.mp4");

        std::fs::write(&path, "not json").unwrap();
        assert!(RecorderConfig::load(&path).is_err());
        assert!(RecorderConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(CaptureState::RequestingPermission).unwrap();
        assert_eq!(json["state"], "requestingPermission");

        let failed = CaptureState::Failed {
            error: CaptureErrorKind::PermissionDenied,
        };
        assert!(!failed.is_active());
        assert!(CaptureState::Recording.is_active());
    }
}

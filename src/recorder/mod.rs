//! Recording system module
//!
//! This module implements the capture lifecycle:
//! - ChunkedRecorder trait for turning a live stream into encoded chunks
//! - CaptureController to drive permission, recording and finalization
//! - ArtifactStore holding the finished recording behind a revocable reference

pub mod artifact;
pub mod channel;
pub mod controller;
pub mod pipe;
pub mod state;

pub use artifact::{Artifact, ArtifactRef, ArtifactStore};
pub use channel::{ChunkedRecorder, RecorderError, RecorderEvent, RecorderFactory};
pub use controller::{CaptureController, ControllerEvent};
pub use pipe::{PipeRecorder, PipeRecorderFactory};
pub use state::{CaptureSession, CaptureState, FinishReason, MediaContainer, RecorderConfig};

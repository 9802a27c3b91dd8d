//! Screen capture sources
//!
//! The capture source abstraction plus an ffmpeg-backed implementation that
//! grabs the desktop (and optionally audio) on Linux, macOS and Windows.

pub mod ffmpeg;
pub mod traits;

pub use ffmpeg::{FfmpegCaptureSource, FfmpegConfig, Platform};
pub use traits::{
    CaptureConstraints, CaptureError, CaptureErrorKind, CaptureResult, LiveStream,
    ScreenCaptureSource, TrackInfo, TrackKind,
};

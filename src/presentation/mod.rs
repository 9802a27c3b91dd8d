//! Presentation layer
//!
//! Maps controller state onto the video surface and the control view.

pub mod video;
pub mod view;

pub use video::{PlaybackSource, PlaybackSurface, SurfaceBinding, VideoPresenter};
pub use view::{ControlView, DownloadLink};

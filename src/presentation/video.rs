//! Video presentation adapter
//!
//! Binds the live stream or the finished recording to a playback surface.
//! Live capture plays muted and inline with no save option; a finished
//! recording starts paused with transport controls and can be saved.

use crate::recorder::artifact::ArtifactRef;
use serde::{Deserialize, Serialize};

/// What the playback surface shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlaybackSource {
    /// Nothing to show
    Empty,
    /// The stream currently being captured, followed through the recorded bytes
    #[serde(rename_all = "camelCase")]
    Live { stream_id: String, mime_type: String },
    /// A finished recording
    Artifact { artifact: ArtifactRef },
}

/// Source plus the playback flags applied to the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceBinding {
    pub source: PlaybackSource,
    pub muted: bool,
    pub autoplay: bool,
    pub plays_inline: bool,
    pub paused: bool,
    pub controls: bool,
    /// Offer saving the media from the player itself
    pub allow_download: bool,
}

impl SurfaceBinding {
    pub fn for_source(source: PlaybackSource) -> Self {
        match source {
            PlaybackSource::Empty => Self {
                source,
                muted: true,
                autoplay: false,
                plays_inline: true,
                paused: true,
                controls: false,
                allow_download: false,
            },
            PlaybackSource::Live { .. } => Self {
                source,
                muted: true,
                autoplay: true,
                plays_inline: true,
                paused: false,
                controls: true,
                // Saving mid-capture would only yield a partial recording
                allow_download: false,
            },
            PlaybackSource::Artifact { .. } => Self {
                source,
                muted: true,
                autoplay: false,
                plays_inline: true,
                paused: true,
                controls: true,
                allow_download: true,
            },
        }
    }
}

/// Something that can play a [`SurfaceBinding`], e.g. a video element in the webview
pub trait PlaybackSurface: Send {
    fn attach(&mut self, binding: &SurfaceBinding);
}

/// Keeps a surface bound to the current playback source
pub struct VideoPresenter<S: PlaybackSurface> {
    surface: S,
    current: Option<PlaybackSource>,
}

impl<S: PlaybackSurface> VideoPresenter<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            current: None,
        }
    }

    /// Bind `source` to the surface. Returns false if it was already bound.
    pub fn present(&mut self, source: PlaybackSource) -> bool {
        if self.current.as_ref() == Some(&source) {
            return false;
        }

        let binding = SurfaceBinding::for_source(source.clone());
        tracing::debug!("Binding video surface to {:?}", binding.source);
        self.surface.attach(&binding);
        self.current = Some(source);
        true
    }

    pub fn current(&self) -> Option<&PlaybackSource> {
        self.current.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::artifact::{Artifact, ArtifactStore};

    #[derive(Default)]
    struct RecordingSurface {
        bindings: Vec<SurfaceBinding>,
    }

    impl PlaybackSurface for RecordingSurface {
        fn attach(&mut self, binding: &SurfaceBinding) {
            self.bindings.push(binding.clone());
        }
    }

    #[test]
    fn test_live_binding_flags() {
        let binding = SurfaceBinding::for_source(PlaybackSource::Live {
            stream_id: "s1".to_string(),
            mime_type: "video/webm".to_string(),
        });
        assert!(binding.muted);
        assert!(binding.autoplay);
        assert!(binding.plays_inline);
        assert!(!binding.paused);
        assert!(!binding.allow_download);
    }

    #[test]
    fn test_artifact_binding_flags() {
        let mut store = ArtifactStore::new();
        let artifact = store.insert(Artifact::new(vec![1], "video/webm"));
        let binding = SurfaceBinding::for_source(PlaybackSource::Artifact { artifact });
        assert!(binding.paused);
        assert!(binding.muted);
        assert!(!binding.autoplay);
        assert!(binding.controls);
        assert!(binding.allow_download);
    }

    #[test]
    fn test_rebinds_only_on_change() {
        let mut presenter = VideoPresenter::new(RecordingSurface::default());
        let live = PlaybackSource::Live {
            stream_id: "s1".to_string(),
            mime_type: "video/webm".to_string(),
        };

        assert!(presenter.present(live.clone()));
        assert!(!presenter.present(live.clone()));
        assert!(presenter.present(PlaybackSource::Empty));
        assert!(presenter.present(live));

        assert_eq!(presenter.surface().bindings.len(), 3);
        assert!(matches!(presenter.current(), Some(PlaybackSource::Live { .. })));
    }
}

//! Control view model
//!
//! The single start/stop button, the inline error line and the download link,
//! derived from the controller state.

use super::video::{PlaybackSource, SurfaceBinding};
use crate::capture::traits::CaptureErrorKind;
use crate::recorder::artifact::ArtifactRef;
use crate::recorder::state::{CaptureState, RecorderConfig};
use serde::Serialize;

pub const START_LABEL: &str = "Start Capture";
pub const STOP_LABEL: &str = "Stop Capture";

/// Link to the finished recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub href: ArtifactRef,
    pub mime_type: String,
    pub file_name: String,
    pub label: String,
}

/// Everything the UI renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlView {
    pub recording: bool,
    pub button_label: String,
    pub error_message: Option<String>,
    pub download: Option<DownloadLink>,
    pub video: SurfaceBinding,
}

impl ControlView {
    pub fn build(
        state: &CaptureState,
        last_error: Option<&CaptureErrorKind>,
        artifact: Option<(&ArtifactRef, &str)>,
        config: &RecorderConfig,
        playback: PlaybackSource,
    ) -> Self {
        let recording = state.is_recording();
        let button_label = if recording { STOP_LABEL } else { START_LABEL };

        let download = artifact.map(|(href, mime_type)| DownloadLink {
            href: href.clone(),
            mime_type: mime_type.to_string(),
            file_name: config.suggested_file_name(),
            label: format!("Download {}", config.container.label()),
        });

        Self {
            recording,
            button_label: button_label.to_string(),
            error_message: last_error.map(CaptureErrorKind::user_message),
            download,
            video: SurfaceBinding::for_source(playback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::artifact::{Artifact, ArtifactStore};
    use crate::recorder::state::MediaContainer;

    #[test]
    fn test_idle_view() {
        let view = ControlView::build(
            &CaptureState::Idle,
            None,
            None,
            &RecorderConfig::default(),
            PlaybackSource::Empty,
        );
        assert!(!view.recording);
        assert_eq!(view.button_label, START_LABEL);
        assert!(view.error_message.is_none());
        assert!(view.download.is_none());
    }

    #[test]
    fn test_finished_view_offers_download() {
        let mut store = ArtifactStore::new();
        let artifact = store.insert(Artifact::new(vec![1, 2], "video/webm"));
        let state = CaptureState::Finished {
            artifact: artifact.clone(),
        };

        let view = ControlView::build(
            &state,
            None,
            Some((&artifact, "video/webm")),
            &RecorderConfig::default(),
            PlaybackSource::Artifact {
                artifact: artifact.clone(),
            },
        );

        let download = view.download.unwrap();
        assert_eq!(download.href, artifact);
        assert_eq!(download.mime_type, "video/webm");
        assert_eq!(download.file_name, "screenrecording.webm");
        assert_eq!(download.label, "Download WebM");
        assert!(view.video.allow_download);
    }

    #[test]
    fn test_failed_view_shows_message() {
        let error = CaptureErrorKind::PermissionDenied;
        let config = RecorderConfig {
            container: MediaContainer::Mp4,
            ..Default::default()
        };
        let view = ControlView::build(
            &CaptureState::Failed {
                error: error.clone(),
            },
            Some(&error),
            None,
            &config,
            PlaybackSource::Empty,
        );
        assert_eq!(view.button_label, START_LABEL);
        assert_eq!(view.error_message, Some(error.user_message()));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let view = ControlView::build(
            &CaptureState::Recording,
            None,
            None,
            &RecorderConfig::default(),
            PlaybackSource::Live {
                stream_id: "s1".to_string(),
                mime_type: "video/webm; codecs=\"vp8\"".to_string(),
            },
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["buttonLabel"], STOP_LABEL);
        assert_eq!(json["video"]["source"]["kind"], "live");
        assert_eq!(json["video"]["source"]["streamId"], "s1");
        assert_eq!(json["video"]["source"]["mimeType"], "video/webm; codecs=\"vp8\"");
        assert_eq!(json["video"]["playsInline"], true);
    }
}

//! Capture-related Tauri commands

use crate::presentation::video::{PlaybackSurface, SurfaceBinding};
use crate::presentation::view::ControlView;
use crate::recorder::artifact::ArtifactRef;
use crate::recorder::controller::CaptureController;
use crate::recorder::state::CaptureState;
use crate::utils::error::ErrorResponse;
use std::path::PathBuf;
use tauri::ipc::Response;
use tauri::{AppHandle, Emitter, State};

/// Event carrying controller events to the webview
pub const CAPTURE_EVENT: &str = "capture-event";

/// Event carrying the binding for the video element
pub const VIDEO_BINDING_EVENT: &str = "video-binding";

/// Application state for capturing
pub struct RecorderState {
    pub controller: CaptureController,
}

impl RecorderState {
    pub fn new(controller: CaptureController) -> Self {
        Self { controller }
    }
}

/// Playback surface living in the webview; bindings are pushed as events
pub struct WebviewSurface {
    app: AppHandle,
}

impl WebviewSurface {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl PlaybackSurface for WebviewSurface {
    fn attach(&mut self, binding: &SurfaceBinding) {
        if let Err(e) = self.app.emit(VIDEO_BINDING_EVENT, binding) {
            tracing::warn!("Failed to emit {}: {}", VIDEO_BINDING_EVENT, e);
        }
    }
}

/// Start a capture session; resolves once permission was granted or refused
#[tauri::command]
pub async fn start_capture(state: State<'_, RecorderState>) -> Result<CaptureState, ErrorResponse> {
    Ok(state.controller.start().await)
}

/// Stop the running capture session
#[tauri::command]
pub async fn stop_capture(state: State<'_, RecorderState>) -> Result<CaptureState, ErrorResponse> {
    Ok(state.controller.stop())
}

/// Start or stop, depending on the current state
#[tauri::command]
pub async fn toggle_capture(state: State<'_, RecorderState>) -> Result<CaptureState, ErrorResponse> {
    Ok(state.controller.toggle().await)
}

#[tauri::command]
pub async fn get_capture_state(
    state: State<'_, RecorderState>,
) -> Result<CaptureState, ErrorResponse> {
    Ok(state.controller.state())
}

/// Everything the control needs to render
#[tauri::command]
pub async fn get_control_view(state: State<'_, RecorderState>) -> Result<ControlView, ErrorResponse> {
    Ok(state.controller.control_view())
}

/// Check whether screen capture is available at all
#[tauri::command]
pub async fn check_capture_supported(state: State<'_, RecorderState>) -> Result<bool, ErrorResponse> {
    Ok(state.controller.is_supported().await)
}

/// Raw bytes of a finished recording
#[tauri::command]
pub async fn read_artifact(
    state: State<'_, RecorderState>,
    reference: String,
) -> Result<Response, ErrorResponse> {
    let reference: ArtifactRef = reference.parse()?;
    let artifact = state.controller.read_artifact(&reference)?;
    Ok(Response::new(artifact.bytes().to_vec()))
}

/// Bytes recorded past `offset`, fed to the live preview while capturing
#[tauri::command]
pub async fn read_live_media(
    state: State<'_, RecorderState>,
    offset: usize,
) -> Result<Response, ErrorResponse> {
    let bytes = state.controller.live_media(offset)?;
    Ok(Response::new(bytes))
}

/// Save a finished recording into `dir`, returning the written path
#[tauri::command]
pub async fn save_artifact(
    state: State<'_, RecorderState>,
    reference: String,
    dir: String,
) -> Result<String, ErrorResponse> {
    let reference: ArtifactRef = reference.parse()?;
    let path = state
        .controller
        .save_artifact(&reference, &PathBuf::from(dir))
        .map_err(|e| {
            tracing::error!("Failed to save {}: {}", reference, e);
            e
        })?;

    tracing::info!("Saved recording to {:?}", path);
    Ok(path.to_string_lossy().to_string())
}


//! Capture lifecycle controller
//!
//! Owns the one capture session that may be active at a time. It asks the
//! capture source for a stream, binds a chunked recorder to it, collects the
//! chunks and turns them into a downloadable artifact when the stream ends,
//! whether the user stopped it or the source did.

use super::artifact::{Artifact, ArtifactRef, ArtifactStore};
use super::channel::{ChunkedRecorder, RecorderEvent, RecorderFactory};
use super::state::{CaptureSession, CaptureState, FinishReason, RecorderConfig};
use crate::capture::traits::{CaptureErrorKind, LiveStream, ScreenCaptureSource};
use crate::presentation::video::PlaybackSource;
use crate::presentation::view::ControlView;
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long a recorder gets to hand over its tail once the source ended
const RECORDER_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Events emitted while capturing
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// The controller moved to a new state
    StateChanged { state: CaptureState },
    /// A non-empty chunk was appended to the running session
    #[serde(rename_all = "camelCase")]
    ChunkAppended {
        session_id: Uuid,
        size: usize,
        total_bytes: usize,
    },
}

/// Resources held by the session that currently owns the capture source
struct ActiveSession {
    session: CaptureSession,
    stream_id: Option<String>,
    stream: Option<Box<dyn LiveStream>>,
    recorder: Option<Box<dyn ChunkedRecorder>>,
    recorder_stopped: bool,
    listener: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn new(session: CaptureSession) -> Self {
        Self {
            session,
            stream_id: None,
            stream: None,
            recorder: None,
            recorder_stopped: false,
            listener: None,
        }
    }

    /// Stop the recorder and every track, and unsubscribe. Safe to call twice.
    fn release(&mut self) {
        self.stop_recorder();
        self.recorder = None;
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Stopping {} tracks of stream {}", stream.tracks().len(), stream.id());
            stream.stop_tracks();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    fn stop_recorder(&mut self) {
        if self.recorder_stopped {
            return;
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
            self.recorder_stopped = true;
        }
    }
}

struct ControllerInner {
    state: CaptureState,
    active: Option<ActiveSession>,
    last_session: Option<CaptureSession>,
    last_error: Option<CaptureErrorKind>,
    current_artifact: Option<ArtifactRef>,
    artifacts: ArtifactStore,
}

impl ControllerInner {
    fn is_current(&self, session_id: Uuid) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.session.id == session_id)
    }
}

/// Drives capture sessions against a capture source and a recorder factory
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Mutex<ControllerInner>>,
    source: Arc<dyn ScreenCaptureSource>,
    recorders: Arc<dyn RecorderFactory>,
    config: Arc<RecorderConfig>,
    event_tx: broadcast::Sender<ControllerEvent>,
}

impl CaptureController {
    /// Create a new controller
    pub fn new(
        source: Arc<dyn ScreenCaptureSource>,
        recorders: Arc<dyn RecorderFactory>,
        config: RecorderConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Mutex::new(ControllerInner {
                state: CaptureState::Idle,
                active: None,
                last_session: None,
                last_error: None,
                current_artifact: None,
                artifacts: ArtifactStore::new(),
            })),
            source,
            recorders,
            config: Arc::new(config),
            event_tx,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> CaptureState {
        self.inner.lock().state.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().state.is_recording()
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<CaptureErrorKind> {
        self.inner.lock().last_error.clone()
    }

    /// Message for the error line, if the last request failed
    pub fn error_message(&self) -> Option<String> {
        self.last_error().map(|error| error.user_message())
    }

    /// Reference to the artifact of the last finished session
    pub fn current_artifact(&self) -> Option<ArtifactRef> {
        self.inner.lock().current_artifact.clone()
    }

    /// Look up a live artifact
    pub fn artifact(&self, reference: &ArtifactRef) -> Option<Artifact> {
        self.inner.lock().artifacts.get(reference)
    }

    /// Number of artifact references that have not been revoked
    pub fn live_artifact_count(&self) -> usize {
        self.inner.lock().artifacts.live_count()
    }

    /// Snapshot of the session that currently owns the capture source
    pub fn active_session(&self) -> Option<CaptureSession> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// The most recent session that finished or failed
    pub fn last_session(&self) -> Option<CaptureSession> {
        self.inner.lock().last_session.clone()
    }

    /// What the video surface should show right now
    pub fn playback_source(&self) -> PlaybackSource {
        let inner = self.inner.lock();
        self.playback_source_locked(&inner)
    }

    fn playback_source_locked(&self, inner: &ControllerInner) -> PlaybackSource {
        match &inner.state {
            CaptureState::Recording => inner
                .active
                .as_ref()
                .and_then(|active| active.stream_id.clone())
                .map(|stream_id| PlaybackSource::Live {
                    stream_id,
                    mime_type: self
                        .config
                        .container
                        .stream_mime_type(self.config.constraints.audio),
                })
                .unwrap_or(PlaybackSource::Empty),
            CaptureState::Finished { artifact } => PlaybackSource::Artifact {
                artifact: artifact.clone(),
            },
            _ => PlaybackSource::Empty,
        }
    }

    /// Everything the UI needs to render the controls
    pub fn control_view(&self) -> ControlView {
        let inner = self.inner.lock();
        let artifact = inner
            .current_artifact
            .as_ref()
            .and_then(|reference| inner.artifacts.get(reference).map(|artifact| (reference, artifact)));
        ControlView::build(
            &inner.state,
            inner.last_error.as_ref(),
            artifact
                .as_ref()
                .map(|(reference, artifact)| (*reference, artifact.mime_type())),
            &self.config,
            self.playback_source_locked(&inner),
        )
    }

    /// Recorded bytes past `offset` of the running session, for the live preview
    pub fn live_media(&self, offset: usize) -> AppResult<Vec<u8>> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.active) {
            (CaptureState::Recording, Some(active)) => Ok(active.session.bytes_since(offset)),
            _ => Err(AppError::NotRecording),
        }
    }

    fn transition(&self, inner: &mut ControllerInner, state: CaptureState) {
        tracing::debug!("Capture state: {:?} -> {:?}", inner.state, state);
        inner.state = state.clone();
        let _ = self.event_tx.send(ControllerEvent::StateChanged { state });
    }

    /// Start a new capture session.
    ///
    /// A start while a session is requesting permission or recording is
    /// ignored and the current state is returned. Capture failures end up in
    /// `CaptureState::Failed`; they are never returned as errors.
    pub async fn start(&self) -> CaptureState {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state.is_active() {
                tracing::warn!("Start ignored, a capture session is already active");
                return inner.state.clone();
            }

            inner.last_error = None;
            if let Some(previous) = inner.current_artifact.take() {
                inner.artifacts.revoke(&previous);
            }

            let session = CaptureSession::new();
            let session_id = session.id;
            inner.active = Some(ActiveSession::new(session));
            self.transition(&mut inner, CaptureState::RequestingPermission);
            tracing::info!("Capture session {} requesting permission", session_id);
            session_id
        };

        if !self.source.is_supported().await {
            tracing::warn!("Capture source {} is not available", self.source.id());
            return self.fail(session_id, CaptureErrorKind::NotSupported);
        }

        match self.source.request_capture(&self.config.constraints).await {
            Ok(stream) => self.begin_recording(session_id, stream),
            Err(e) => {
                tracing::warn!("Capture request failed: {}", e);
                self.fail(session_id, e.kind())
            }
        }
    }

    /// Stop the running session. No-op unless recording.
    pub fn stop(&self) -> CaptureState {
        let mut inner = self.inner.lock();
        let session_id = match (&inner.state, &inner.active) {
            (CaptureState::Recording, Some(active)) => active.session.id,
            _ => {
                tracing::debug!("Stop ignored, not recording");
                return inner.state.clone();
            }
        };
        self.finalize_locked(&mut inner, session_id, FinishReason::UserStopped)
    }

    /// Whether the capture source can be asked at all
    pub async fn is_supported(&self) -> bool {
        self.source.is_supported().await
    }

    /// The single start/stop control
    pub async fn toggle(&self) -> CaptureState {
        match self.state() {
            CaptureState::Recording => self.stop(),
            state @ CaptureState::RequestingPermission => state,
            _ => self.start().await,
        }
    }

    /// Tear everything down: release the active session and revoke the artifact
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(mut active) = inner.active.take() {
            tracing::info!("Releasing capture session {} on shutdown", active.session.id);
            active.release();
        }
        if let Some(artifact) = inner.current_artifact.take() {
            inner.artifacts.revoke(&artifact);
        }
        inner.last_error = None;
        self.transition(&mut inner, CaptureState::Idle);
    }

    /// Copy of a live artifact, or an error if it was revoked
    pub fn read_artifact(&self, reference: &ArtifactRef) -> AppResult<Artifact> {
        self.artifact(reference)
            .ok_or_else(|| AppError::ArtifactNotFound(reference.to_string()))
    }

    /// Save a live artifact into `dir` under the suggested file name
    pub fn save_artifact(&self, reference: &ArtifactRef, dir: &Path) -> AppResult<PathBuf> {
        let artifact = self.read_artifact(reference)?;
        let path = artifact.save_to(dir, &self.config.suggested_file_name())?;
        Ok(path)
    }

    fn fail(&self, session_id: Uuid, error: CaptureErrorKind) -> CaptureState {
        let mut inner = self.inner.lock();
        if !inner.is_current(session_id) {
            return inner.state.clone();
        }

        if let Some(mut active) = inner.active.take() {
            active.release();
            active.session.fail(error.clone());
            inner.last_session = Some(active.session);
        }
        tracing::info!("Capture session {} failed: {:?}", session_id, error);
        inner.last_error = Some(error.clone());
        self.transition(&mut inner, CaptureState::Failed { error });
        inner.state.clone()
    }

    fn begin_recording(&self, session_id: Uuid, mut stream: Box<dyn LiveStream>) -> CaptureState {
        let mut inner = self.inner.lock();
        if !inner.is_current(session_id) || inner.state != CaptureState::RequestingPermission {
            tracing::info!("Session {} was superseded, releasing its stream", session_id);
            stream.stop_tracks();
            return inner.state.clone();
        }

        let mime_type = self.config.container.mime_type();
        let mut recorder = match self.recorders.create(stream.as_mut(), mime_type) {
            Ok(recorder) => recorder,
            Err(e) => {
                stream.stop_tracks();
                drop(inner);
                return self.fail(session_id, CaptureErrorKind::Unknown(e.to_string()));
            }
        };

        let ended = stream.take_ended_signal();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = recorder.start(self.config.chunk_interval(), events_tx) {
            stream.stop_tracks();
            drop(inner);
            return self.fail(session_id, CaptureErrorKind::Unknown(e.to_string()));
        }

        let listener = tokio::spawn(self.clone().listen(session_id, events_rx, ended));

        if let Some(active) = inner.active.as_mut() {
            tracing::info!(
                "Capture session {} recording stream {} with {} tracks",
                session_id,
                stream.id(),
                stream.tracks().len()
            );
            active.stream_id = Some(stream.id().to_string());
            active.stream = Some(stream);
            active.recorder = Some(recorder);
            active.listener = Some(listener);
            active.session.begin_recording();
        }
        self.transition(&mut inner, CaptureState::Recording);
        inner.state.clone()
    }

    /// Per-session subscription to the recorder and the stream's end signal
    async fn listen(
        self,
        session_id: Uuid,
        mut events: mpsc::UnboundedReceiver<RecorderEvent>,
        ended: Option<oneshot::Receiver<()>>,
    ) {
        let ended = async move {
            match ended {
                Some(ended) => {
                    let _ = ended.await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(ended);

        loop {
            // Queued chunks are handled before the end signal
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(RecorderEvent::DataAvailable(chunk)) => self.handle_chunk(session_id, chunk),
                    Some(RecorderEvent::Stopped) | None => {
                        self.finalize(session_id, FinishReason::RecorderStopped);
                        break;
                    }
                },
                _ = &mut ended => {
                    self.flush_recorder(session_id, &mut events).await;
                    self.finalize(session_id, FinishReason::SourceEnded);
                    break;
                }
            }
        }
    }

    /// Stop the recorder and keep its remaining chunks; the source is gone but
    /// everything it produced still belongs to the recording.
    async fn flush_recorder(
        &self,
        session_id: Uuid,
        events: &mut mpsc::UnboundedReceiver<RecorderEvent>,
    ) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_recording() || !inner.is_current(session_id) {
                return;
            }
            if let Some(active) = inner.active.as_mut() {
                active.stop_recorder();
            }
        }

        let drain = async {
            while let Some(event) = events.recv().await {
                match event {
                    RecorderEvent::DataAvailable(chunk) => self.handle_chunk(session_id, chunk),
                    RecorderEvent::Stopped => break,
                }
            }
        };
        if tokio::time::timeout(RECORDER_FLUSH_TIMEOUT, drain).await.is_err() {
            tracing::warn!(
                "Recorder of session {} did not stop within {:?}",
                session_id,
                RECORDER_FLUSH_TIMEOUT
            );
        }
    }

    fn handle_chunk(&self, session_id: Uuid, chunk: Vec<u8>) {
        let mut inner = self.inner.lock();
        if !inner.state.is_recording() || !inner.is_current(session_id) {
            tracing::trace!("Dropping chunk for session {}, not recording", session_id);
            return;
        }

        let size = chunk.len();
        let appended = inner.active.as_mut().and_then(|active| {
            active
                .session
                .push_chunk(chunk)
                .then_some(active.session.total_bytes)
        });

        if let Some(total_bytes) = appended {
            let _ = self.event_tx.send(ControllerEvent::ChunkAppended {
                session_id,
                size,
                total_bytes,
            });
        }
    }

    fn finalize(&self, session_id: Uuid, reason: FinishReason) -> CaptureState {
        let mut inner = self.inner.lock();
        self.finalize_locked(&mut inner, session_id, reason)
    }

    /// Build the artifact. Runs at most once per session, whichever trigger comes first.
    fn finalize_locked(
        &self,
        inner: &mut ControllerInner,
        session_id: Uuid,
        reason: FinishReason,
    ) -> CaptureState {
        if !inner.state.is_recording() || !inner.is_current(session_id) {
            tracing::debug!("Session {} already finalized", session_id);
            return inner.state.clone();
        }
        let Some(mut active) = inner.active.take() else {
            return inner.state.clone();
        };

        let mime_type = active
            .recorder
            .as_ref()
            .map(|recorder| recorder.mime_type().to_string())
            .unwrap_or_else(|| self.config.container.mime_type().to_string());
        active.release();

        let bytes = active.session.finish(reason);
        if let Some(previous) = inner.current_artifact.take() {
            inner.artifacts.revoke(&previous);
        }
        let artifact = inner.artifacts.insert(Artifact::new(bytes, mime_type));

        tracing::info!(
            "Capture session {} finished ({:?}): {} chunks, {} bytes, {}ms",
            session_id,
            reason,
            active.session.chunk_count(),
            active.session.total_bytes,
            active.session.duration_ms()
        );

        inner.current_artifact = Some(artifact.clone());
        inner.last_session = Some(active.session);
        self.transition(inner, CaptureState::Finished { artifact });
        inner.state.clone()
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("source", &self.source.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

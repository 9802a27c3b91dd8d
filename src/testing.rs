//! Fake capture source, stream and recorder for tests

use crate::capture::traits::{
    CaptureConstraints, CaptureError, CaptureResult, LiveStream, MediaPipe, ScreenCaptureSource,
    TrackInfo, TrackKind,
};
use crate::recorder::channel::{
    ChunkedRecorder, RecorderError, RecorderEvent, RecorderEventSender, RecorderFactory,
    RecorderResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Poll `condition` until it holds, panicking after two seconds
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// What the fake source answers to the next request
pub(crate) enum Outcome {
    Grant,
    Deny,
    Unsupported,
    Fail(String),
}

/// Observes a fake stream after it was handed to the controller
#[derive(Default)]
pub(crate) struct StreamHandle {
    track_stops: Mutex<HashMap<String, usize>>,
    ended_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl StreamHandle {
    /// Simulate the source ending the stream (sharing revoked)
    pub(crate) fn end(&self) {
        if let Some(tx) = self.ended_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    pub(crate) fn every_track_stopped_exactly_once(&self) -> bool {
        let stops = self.track_stops.lock();
        !stops.is_empty() && stops.values().all(|&count| count == 1)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.track_stops.lock().values().all(|&count| count == 0)
    }
}

struct FakeStream {
    id: String,
    tracks: Vec<TrackInfo>,
    handle: Arc<StreamHandle>,
    ended_rx: Option<oneshot::Receiver<()>>,
    media: Option<MediaPipe>,
}

impl LiveStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.clone()
    }

    fn take_ended_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ended_rx.take()
    }

    fn take_media(&mut self) -> Option<MediaPipe> {
        self.media.take()
    }

    fn stop_tracks(&mut self) {
        let mut stops = self.handle.track_stops.lock();
        for track in &self.tracks {
            *stops.entry(track.id.clone()).or_insert(0) += 1;
        }
    }
}

/// Capture source answering from a queue of outcomes, granting once it runs dry
pub(crate) struct FakeSource {
    supported: bool,
    outcomes: Mutex<VecDeque<Outcome>>,
    gate: Option<Arc<Notify>>,
    media: Mutex<Option<MediaPipe>>,
    requests: AtomicUsize,
    handles: Mutex<Vec<Arc<StreamHandle>>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::with_outcomes(Vec::new())
    }

    pub(crate) fn with_outcomes(outcomes: Vec<Outcome>) -> Self {
        Self {
            supported: true,
            outcomes: Mutex::new(outcomes.into()),
            gate: None,
            media: Mutex::new(None),
            requests: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// A source reporting that capture is unavailable
    pub(crate) fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// A source whose first granted stream carries `media`
    pub(crate) fn with_media(media: MediaPipe) -> Self {
        Self {
            media: Mutex::new(Some(media)),
            ..Self::new()
        }
    }

    /// A source whose requests wait for [`FakeSource::release_gate`]
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::new()
        }
    }

    pub(crate) fn release_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn last_handle(&self) -> Option<Arc<StreamHandle>> {
        self.handles.lock().last().cloned()
    }

    /// Streams handed out whose tracks were never stopped
    pub(crate) fn live_stream_count(&self) -> usize {
        self.handles.lock().iter().filter(|handle| handle.is_live()).count()
    }

    fn grant(&self) -> Box<dyn LiveStream> {
        let (ended_tx, ended_rx) = oneshot::channel();
        let handle = Arc::new(StreamHandle::default());
        *handle.ended_tx.lock() = Some(ended_tx);

        let tracks = vec![
            TrackInfo {
                id: "video-0".to_string(),
                kind: TrackKind::Video,
                label: "fake screen".to_string(),
            },
            TrackInfo {
                id: "audio-0".to_string(),
                kind: TrackKind::Audio,
                label: "fake audio".to_string(),
            },
        ];
        {
            let mut stops = handle.track_stops.lock();
            for track in &tracks {
                stops.insert(track.id.clone(), 0);
            }
        }

        let mut handles = self.handles.lock();
        handles.push(handle.clone());
        Box::new(FakeStream {
            id: format!("fake-stream-{}", handles.len()),
            tracks,
            handle,
            ended_rx: Some(ended_rx),
            media: self.media.lock().take(),
        })
    }
}

#[async_trait]
impl ScreenCaptureSource for FakeSource {
    fn id(&self) -> &str {
        "fake"
    }

    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_capture(
        &self,
        _constraints: &CaptureConstraints,
    ) -> CaptureResult<Box<dyn LiveStream>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let outcome = self.outcomes.lock().pop_front().unwrap_or(Outcome::Grant);
        match outcome {
            Outcome::Grant => Ok(self.grant()),
            Outcome::Deny => Err(CaptureError::PermissionDenied("user canceled".to_string())),
            Outcome::Unsupported => Err(CaptureError::NotSupported("no display".to_string())),
            Outcome::Fail(detail) => Err(CaptureError::Other(detail)),
        }
    }
}

/// Drives a fake recorder from the test
#[derive(Default)]
pub(crate) struct RecorderHandle {
    events: Mutex<Option<RecorderEventSender>>,
    stops: AtomicUsize,
}

impl RecorderHandle {
    /// Deliver a chunk as if the recorder emitted it; ignored once nobody listens
    pub(crate) fn emit(&self, chunk: &[u8]) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(RecorderEvent::DataAvailable(chunk.to_vec()));
        }
    }

    /// Report that the recorder stopped on its own
    pub(crate) fn finish(&self) {
        if let Some(events) = self.events.lock().take() {
            let _ = events.send(RecorderEvent::Stopped);
        }
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct FakeRecorder {
    mime_type: String,
    handle: Arc<RecorderHandle>,
}

impl ChunkedRecorder for FakeRecorder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self, _interval: Duration, events: RecorderEventSender) -> RecorderResult<()> {
        *self.handle.events.lock() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.handle.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = self.handle.events.lock().take() {
            let _ = events.send(RecorderEvent::Stopped);
        }
    }

    fn is_recording(&self) -> bool {
        self.handle.events.lock().is_some()
    }
}

/// Recorder factory handing out [`FakeRecorder`]s
#[derive(Default)]
pub(crate) struct FakeRecorderFactory {
    fail: bool,
    handles: Mutex<Vec<Arc<RecorderHandle>>>,
}

impl FakeRecorderFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A factory that cannot bind to any stream
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn last_handle(&self) -> Option<Arc<RecorderHandle>> {
        self.handles.lock().last().cloned()
    }
}

impl RecorderFactory for FakeRecorderFactory {
    fn create(
        &self,
        stream: &mut dyn LiveStream,
        mime_type: &str,
    ) -> RecorderResult<Box<dyn ChunkedRecorder>> {
        if self.fail {
            return Err(RecorderError::NoMedia(stream.id().to_string()));
        }

        let handle = Arc::new(RecorderHandle::default());
        self.handles.lock().push(handle.clone());
        Ok(Box::new(FakeRecorder {
            mime_type: mime_type.to_string(),
            handle,
        }))
    }
}

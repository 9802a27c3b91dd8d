//! Recorder reading an encoded media pipe
//!
//! The capture source already encodes; this recorder only slices its output
//! into timed chunks, the way a platform media recorder hands out blobs.

use super::channel::{
    ChunkedRecorder, RecorderError, RecorderEvent, RecorderEventSender, RecorderFactory,
    RecorderResult,
};
use super::state::MediaContainer;
use crate::capture::traits::{LiveStream, MediaPipe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Read buffer size for the media pipe
const READ_BUFFER_SIZE: usize = 32 * 1024;

/// How long a stopped recorder keeps reading for bytes already in the pipe
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Creates [`PipeRecorder`]s for streams that expose a media pipe
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeRecorderFactory;

impl RecorderFactory for PipeRecorderFactory {
    fn create(
        &self,
        stream: &mut dyn LiveStream,
        mime_type: &str,
    ) -> RecorderResult<Box<dyn ChunkedRecorder>> {
        if MediaContainer::from_mime(mime_type).is_none() {
            return Err(RecorderError::UnsupportedContainer(mime_type.to_string()));
        }

        let media = stream
            .take_media()
            .ok_or_else(|| RecorderError::NoMedia(stream.id().to_string()))?;

        Ok(Box::new(PipeRecorder::new(media, mime_type)))
    }
}

/// Chunked recorder over a [`MediaPipe`]
pub struct PipeRecorder {
    mime_type: String,
    media: Option<MediaPipe>,
    is_recording: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PipeRecorder {
    pub fn new(media: MediaPipe, mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            media: Some(media),
            is_recording: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }
}

impl ChunkedRecorder for PipeRecorder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self, interval: Duration, events: RecorderEventSender) -> RecorderResult<()> {
        let media = self.media.take().ok_or(RecorderError::AlreadyStarted)?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let is_recording = self.is_recording.clone();
        is_recording.store(true, Ordering::SeqCst);

        tracing::debug!("Pipe recorder started, emitting every {:?}", interval);
        self.handle = Some(tokio::spawn(pump(media, interval, events, stop_rx, is_recording)));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }
}

impl Drop for PipeRecorder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn pump(
    media: MediaPipe,
    interval: Duration,
    events: RecorderEventSender,
    mut stop_rx: oneshot::Receiver<()>,
    is_recording: Arc<AtomicBool>,
) {
    let MediaPipe { prefix, mut reader } = media;
    let mut buffered = prefix;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                drain_to_eof(&mut reader, &mut buffered, &mut buf).await;
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!("Media pipe reached end of stream");
                    break;
                }
                Ok(n) => buffered.extend_from_slice(&buf[..n]),
                Err(e) => {
                    tracing::warn!("Failed to read media pipe: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => {
                if events.send(RecorderEvent::DataAvailable(std::mem::take(&mut buffered))).is_err() {
                    // Nobody listens anymore
                    break;
                }
            }
        }
    }

    if !buffered.is_empty() {
        let _ = events.send(RecorderEvent::DataAvailable(buffered));
    }
    is_recording.store(false, Ordering::SeqCst);
    let _ = events.send(RecorderEvent::Stopped);
}

/// Read what the source already wrote, up to end of stream or the drain timeout
async fn drain_to_eof<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buffered: &mut Vec<u8>,
    buf: &mut [u8],
) {
    let drain = async {
        loop {
            match reader.read(buf).await {
                Ok(0) => break,
                Ok(n) => buffered.extend_from_slice(&buf[..n]),
                Err(e) => {
                    tracing::warn!("Failed to drain media pipe: {}", e);
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(STOP_DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::debug!("Media pipe still open after stop, flushing what arrived");
    }
}

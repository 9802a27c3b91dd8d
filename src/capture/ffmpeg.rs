//! Screen capture through the ffmpeg platform grabbers
//!
//! ffmpeg does both the grabbing (x11grab, avfoundation, gdigrab) and the
//! encoding; we only read its encoded output from stdout. The process is the
//! live stream: its tracks stop together and its exit ends the stream.

use super::traits::{
    CaptureConstraints, CaptureError, CaptureResult, CursorVisibility, LiveStream, MediaPipe,
    ScreenCaptureSource, TrackInfo, TrackKind,
};
use crate::recorder::state::MediaContainer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Size of the first read used to detect that capture actually started
const STARTUP_READ_SIZE: usize = 64 * 1024;

/// Number of stderr lines kept for error classification
const STDERR_TAIL_LINES: usize = 20;

/// Operating system flavour, which decides the grabber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// ffmpeg capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FfmpegConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,

    /// Grabber video input override (X display, avfoundation device, gdigrab target)
    pub video_input: Option<String>,

    /// Grabber audio input override (pulse source, avfoundation device, dshow device)
    pub audio_input: Option<String>,

    /// Capture frame rate
    pub frame_rate: u32,

    /// Time ffmpeg gets to finish cleanly after being asked to quit
    pub stop_grace_ms: u64,

    /// Container the encoded output is muxed into
    pub container: MediaContainer,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            video_input: None,
            audio_input: None,
            frame_rate: 30,
            stop_grace_ms: 3000,
            container: MediaContainer::default(),
        }
    }
}

/// Screen-capture source backed by an ffmpeg child process
pub struct FfmpegCaptureSource {
    config: FfmpegConfig,
    platform: Platform,
}

impl FfmpegCaptureSource {
    /// Create a source for the current platform
    pub fn new(config: FfmpegConfig) -> Self {
        Self::with_platform(config, Platform::current())
    }

    /// Create a source targeting an explicit platform
    pub fn with_platform(config: FfmpegConfig, platform: Platform) -> Self {
        Self { config, platform }
    }

    /// Full ffmpeg argument list for a request, or `None` if the platform has no grabber
    pub fn build_args(&self, constraints: &CaptureConstraints) -> Option<(Vec<String>, Vec<TrackInfo>)> {
        let (mut args, tracks) = input_args(&self.config, self.platform, constraints)?;
        let has_audio = tracks.iter().any(|t| t.kind == TrackKind::Audio);

        let mut full = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
        ];
        full.append(&mut args);
        full.extend(output_args(self.config.container, has_audio));
        Some((full, tracks))
    }
}

/// Grabber input arguments and the tracks they produce
fn input_args(
    config: &FfmpegConfig,
    platform: Platform,
    constraints: &CaptureConstraints,
) -> Option<(Vec<String>, Vec<TrackInfo>)> {
    let draw_cursor = match constraints.video.cursor {
        CursorVisibility::Always | CursorVisibility::Motion => "1",
        CursorVisibility::Never => "0",
    };
    let frame_rate = config.frame_rate.to_string();

    let mut args: Vec<String> = Vec::new();
    let mut tracks = Vec::new();
    let mut audio_label = None;

    match platform {
        Platform::Linux => {
            let display = config
                .video_input
                .clone()
                .or_else(|| std::env::var("DISPLAY").ok())
                .unwrap_or_else(|| ":0.0".to_string());
            args.extend(
                ["-f", "x11grab", "-draw_mouse", draw_cursor, "-framerate", frame_rate.as_str(), "-i", display.as_str()]
                    .map(String::from),
            );
            tracks.push(track("video-0", TrackKind::Video, format!("x11grab {}", display)));

            if constraints.audio {
                let source = config.audio_input.clone().unwrap_or_else(|| "default".to_string());
                args.extend(["-f", "pulse", "-i", source.as_str()].map(String::from));
                audio_label = Some(format!("pulse {}", source));
            }
        }
        Platform::MacOs => {
            let screen = config
                .video_input
                .clone()
                .unwrap_or_else(|| "Capture screen 0".to_string());
            let audio = if constraints.audio {
                config.audio_input.clone().unwrap_or_else(|| "0".to_string())
            } else {
                "none".to_string()
            };
            let input = format!("{}:{}", screen, audio);
            args.extend(
                ["-f", "avfoundation", "-capture_cursor", draw_cursor, "-framerate", frame_rate.as_str(), "-i", input.as_str()]
                    .map(String::from),
            );
            tracks.push(track("video-0", TrackKind::Video, format!("avfoundation {}", screen)));
            if constraints.audio {
                audio_label = Some(format!("avfoundation {}", audio));
            }
        }
        Platform::Windows => {
            let target = config.video_input.clone().unwrap_or_else(|| "desktop".to_string());
            args.extend(
                ["-f", "gdigrab", "-draw_mouse", draw_cursor, "-framerate", frame_rate.as_str(), "-i", target.as_str()]
                    .map(String::from),
            );
            tracks.push(track("video-0", TrackKind::Video, format!("gdigrab {}", target)));

            if constraints.audio {
                // dshow has no default device, it must be named
                match &config.audio_input {
                    Some(device) => {
                        args.extend(["-f".to_string(), "dshow".to_string(), "-i".to_string(), format!("audio={}", device)]);
                        audio_label = Some(format!("dshow {}", device));
                    }
                    None => tracing::warn!("No dshow audio device configured, recording video only"),
                }
            }
        }
        Platform::Other => return None,
    }

    if let Some(label) = audio_label {
        tracks.push(track("audio-0", TrackKind::Audio, label));
    }

    Some((args, tracks))
}

/// Encoder and muxer arguments writing to stdout
fn output_args(container: MediaContainer, has_audio: bool) -> Vec<String> {
    let mut args: Vec<&str> = Vec::new();
    match container {
        MediaContainer::WebM => {
            args.extend(["-c:v", "libvpx", "-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M"]);
            if has_audio {
                args.extend(["-c:a", "libopus"]);
            }
            args.extend(["-f", "webm"]);
        }
        MediaContainer::Mp4 => {
            args.extend(["-c:v", "libx264", "-preset", "ultrafast", "-pix_fmt", "yuv420p"]);
            if has_audio {
                args.extend(["-c:a", "aac"]);
            }
            // Fragmented MP4 so the muxer never seeks back into the pipe
            args.extend([
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
                "-f",
                "mp4",
            ]);
        }
    }
    args.push("pipe:1");
    args.into_iter().map(String::from).collect()
}

fn track(id: &str, kind: TrackKind, label: String) -> TrackInfo {
    TrackInfo {
        id: id.to_string(),
        kind,
        label,
    }
}

/// Map the stderr of an ffmpeg that exited before producing output
fn classify_failure(stderr_tail: &[String]) -> CaptureError {
    let joined = stderr_tail.join("\n").to_lowercase();

    if joined.contains("permission denied")
        || joined.contains("not permitted")
        || joined.contains("not authorized")
    {
        return CaptureError::PermissionDenied(
            "the screen grabber was refused access to the display".to_string(),
        );
    }

    if joined.contains("unknown input format") || joined.contains("cannot open display") {
        return CaptureError::NotSupported(
            "no usable screen grabber in this environment".to_string(),
        );
    }

    let detail = stderr_tail
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "ffmpeg exited before producing output".to_string());
    CaptureError::Other(detail)
}

/// Drain stderr so ffmpeg never blocks on it, keeping the last lines
fn spawn_stderr_drain(stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!("ffmpeg: {}", line);
            push_tail(&mut tail, line);
        }
        Vec::from(tail)
    })
}

/// Keep only the last [`STDERR_TAIL_LINES`] lines
fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

#[async_trait]
impl ScreenCaptureSource for FfmpegCaptureSource {
    fn id(&self) -> &str {
        "ffmpeg"
    }

    async fn is_supported(&self) -> bool {
        if self.platform == Platform::Other {
            return false;
        }

        match Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!("ffmpeg not available: {}", e);
                false
            }
        }
    }

    async fn request_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> CaptureResult<Box<dyn LiveStream>> {
        let (args, tracks) = self.build_args(constraints).ok_or_else(|| {
            CaptureError::NotSupported("no screen grabber for this platform".to_string())
        })?;

        tracing::info!("Starting ffmpeg capture: {} {}", self.config.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::NotSupported(format!("{} not found", self.config.ffmpeg_path))
                }
                std::io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied(e.to_string()),
                _ => CaptureError::Other(format!("Failed to start ffmpeg: {}", e)),
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Other("Failed to capture ffmpeg stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CaptureError::Other("Failed to capture ffmpeg stderr".to_string()))?;
        let stderr_tail = spawn_stderr_drain(stderr);

        // Granted once encoded bytes show up; refused if ffmpeg gives up first
        let mut first = vec![0u8; STARTUP_READ_SIZE];
        let read = tokio::select! {
            read = stdout.read(&mut first) => read,
            status = child.wait() => {
                tracing::warn!("ffmpeg exited during startup: {:?}", status);
                let tail = stderr_tail.await.unwrap_or_default();
                return Err(classify_failure(&tail));
            }
        };

        let n = match read {
            Ok(0) => {
                let _ = child.wait().await;
                let tail = stderr_tail.await.unwrap_or_default();
                return Err(classify_failure(&tail));
            }
            Ok(n) => n,
            Err(e) => return Err(CaptureError::Other(format!("Failed to read ffmpeg output: {}", e))),
        };
        first.truncate(n);

        let stream = FfmpegStream::spawn(
            child,
            MediaPipe {
                prefix: first,
                reader: Box::new(stdout),
            },
            tracks,
            Duration::from_millis(self.config.stop_grace_ms),
        );
        tracing::info!("ffmpeg capture running as stream {}", stream.id);
        Ok(Box::new(stream))
    }
}

/// Live stream backed by a running ffmpeg process
pub struct FfmpegStream {
    id: String,
    tracks: Vec<TrackInfo>,
    media: Option<MediaPipe>,
    ended_rx: Option<oneshot::Receiver<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl FfmpegStream {
    fn spawn(mut child: Child, media: MediaPipe, tracks: Vec<TrackInfo>, grace: Duration) -> Self {
        let id = format!("ffmpeg-{}", uuid::Uuid::new_v4());
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (ended_tx, ended_rx) = oneshot::channel();
        let mut stdin = child.stdin.take();
        let stream_id = id.clone();

        // Watches the process; a stop request (or the stream being dropped) ends it
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    tracing::info!("Stream {} ended by the source: {:?}", stream_id, status);
                }
                _ = &mut stop_rx => {
                    if let Some(stdin) = stdin.as_mut() {
                        let _ = stdin.write_all(b"q").await;
                        let _ = stdin.flush().await;
                    }
                    if tokio::time::timeout(grace, child.wait()).await.is_err() {
                        tracing::warn!("ffmpeg did not quit within {:?}, killing it", grace);
                        let _ = child.kill().await;
                    }
                    tracing::debug!("Stream {} stopped", stream_id);
                }
            }
            let _ = ended_tx.send(());
        });

        Self {
            id,
            tracks,
            media: Some(media),
            ended_rx: Some(ended_rx),
            stop_tx: Some(stop_tx),
        }
    }
}

impl LiveStream for FfmpegStream {
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
        // All tracks share the process, one request stops them all
        if let Some(stop_tx) = self.stop_tx.take() {
            for track in &self.tracks {
                tracing::debug!("Stopping track {} ({})", track.id, track.label);
            }
            let _ = stop_tx.send(());
        }
    }
}

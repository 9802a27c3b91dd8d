//! Screen Recorder - capture the screen, keep the chunks, download the result.
//!
//! This is the main library crate. It provides the capture lifecycle
//! controller, the ffmpeg-backed capture source and recorder, the
//! presentation adapters, and (with the `desktop` feature) the Tauri app.

pub mod capture;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod presentation;
pub mod recorder;
pub mod utils;

#[cfg(test)]
mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_recorder=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(feature = "desktop")]
fn load_config() -> recorder::RecorderConfig {
    let Some(path) = std::env::var_os("SCREEN_RECORDER_CONFIG") else {
        return recorder::RecorderConfig::default();
    };

    let path = std::path::PathBuf::from(path);
    match recorder::RecorderConfig::load(&path) {
        Ok(config) => {
            tracing::info!("Loaded recorder config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::warn!("Ignoring recorder config {:?}: {}", path, e);
            recorder::RecorderConfig::default()
        }
    }
}

/// Initialize and run the desktop application
#[cfg(feature = "desktop")]
pub fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use capture::{FfmpegCaptureSource, FfmpegConfig};
    use commands::recording::{RecorderState, WebviewSurface, CAPTURE_EVENT};
    use presentation::VideoPresenter;
    use recorder::{CaptureController, ControllerEvent, PipeRecorderFactory};
    use std::sync::Arc;
    use tauri::{Emitter, Manager};
    use tokio::sync::broadcast::error::RecvError;

    init_tracing();
    tracing::info!("Starting Screen Recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    let mut ffmpeg = FfmpegConfig {
        container: config.container,
        ..Default::default()
    };
    if let Ok(path) = std::env::var("FFMPEG_PATH") {
        ffmpeg.ffmpeg_path = path;
    }

    let controller = CaptureController::new(
        Arc::new(FfmpegCaptureSource::new(ffmpeg)),
        Arc::new(PipeRecorderFactory),
        config,
    );

    let app = tauri::Builder::default()
        .manage(RecorderState::new(controller.clone()))
        .invoke_handler(tauri::generate_handler![
            commands::recording::start_capture,
            commands::recording::stop_capture,
            commands::recording::toggle_capture,
            commands::recording::get_capture_state,
            commands::recording::get_control_view,
            commands::recording::check_capture_supported,
            commands::recording::read_artifact,
            commands::recording::read_live_media,
            commands::recording::save_artifact,
        ])
        .setup(move |app| {
            let handle = app.handle().clone();
            let controller = app.state::<RecorderState>().controller.clone();
            let mut events = controller.subscribe();

            tauri::async_runtime::spawn(async move {
                let mut presenter = VideoPresenter::new(WebviewSurface::new(handle.clone()));
                presenter.present(controller.playback_source());

                loop {
                    let event = match events.recv().await {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Dropped {} capture events", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if let ControllerEvent::StateChanged { .. } = &event {
                        presenter.present(controller.playback_source());
                    }
                    if let Err(e) = handle.emit(CAPTURE_EVENT, &event) {
                        tracing::warn!("Failed to emit {}: {}", CAPTURE_EVENT, e);
                    }
                }
            });
            Ok(())
        })
        .build(tauri::generate_context!())
        .context("error while building tauri application")?;

    app.run(move |_, event| {
        if let tauri::RunEvent::Exit = event {
            tracing::info!("Shutting down capture controller");
            controller.shutdown();
        }
    });
    Ok(())
}

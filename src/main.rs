//! Capture demo over a synthetic two-stream device

use std::time::{Duration, Instant};

use color_eyre::Result;
use serde::Deserialize;
use tracing::{debug, info};

use argus::{
    Device, DeviceInfo, Intrinsics, NullControls, PixelFormat, StreamKind, StreamMode,
    SyntheticEndpoint,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    run_seconds: u64,
    depth: StreamSettings,
    color: StreamSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StreamSettings {
    enabled: bool,
    width: u32,
    height: u32,
    fps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_seconds: 5,
            depth: StreamSettings::default(),
            color: StreamSettings::default(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 0,
            height: 0,
            fps: 0,
        }
    }
}

/// Load `argus.toml` from the working directory, falling back to defaults
fn load_settings() -> Settings {
    config::Config::builder()
        .add_source(config::File::with_name("argus").required(false))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .unwrap_or_default()
}

/// A capability table shaped like a small depth camera: one depth endpoint,
/// one color endpoint
fn demo_device() -> Device {
    let info = DeviceInfo::new("argus synthetic cam")
        .with_intrinsics(Intrinsics {
            width: 640,
            height: 480,
            fx: 595.0,
            fy: 595.0,
            ppx: 320.0,
            ppy: 240.0,
        })
        .with_intrinsics(Intrinsics {
            width: 1280,
            height: 720,
            fx: 920.0,
            fy: 920.0,
            ppx: 640.0,
            ppy: 360.0,
        })
        .with_mode(StreamKind::Depth, depth_mode(640, 480, 30, 0), 0)
        .with_mode(StreamKind::Depth, depth_mode(640, 480, 60, 0), 0)
        .with_mode(StreamKind::Color, color_mode(640, 480, 60, 0), 1)
        .with_mode(StreamKind::Color, color_mode(1280, 720, 30, 1), 1);

    let endpoints: Vec<Box<dyn argus::Endpoint>> = vec![
        Box::new(SyntheticEndpoint::new()),
        Box::new(SyntheticEndpoint::new()),
    ];
    Device::new(info, endpoints, Box::new(NullControls))
}

fn depth_mode(width: u32, height: u32, fps: u32, intrinsics_index: usize) -> StreamMode {
    StreamMode {
        width,
        height,
        format: PixelFormat::Z16,
        fps,
        intrinsics_index,
    }
}

fn color_mode(width: u32, height: u32, fps: u32, intrinsics_index: usize) -> StreamMode {
    StreamMode {
        width,
        height,
        format: PixelFormat::Rgb8,
        fps,
        intrinsics_index,
    }
}

fn enable_from(device: &mut Device, kind: StreamKind, settings: &StreamSettings) -> Result<()> {
    if settings.enabled {
        device.enable_stream(
            kind,
            settings.width,
            settings.height,
            PixelFormat::Any,
            settings.fps,
        )?;
        info!(%kind, mode = ?device.get_stream_mode(kind)?, "stream enabled");
    }
    Ok(())
}

/// Blocking consumer loop: wait for each full frame set and log progress
fn consume(mut device: Device, run: Duration) -> Result<()> {
    let started = Instant::now();
    while started.elapsed() < run {
        device.wait_all_streams()?;
        for kind in StreamKind::ALL {
            if device.is_stream_enabled(kind) {
                debug!(%kind, number = device.get_image_frame_number(kind)?, "frame");
            }
        }
    }
    device.stop_capture()?;

    for kind in StreamKind::ALL {
        if device.is_stream_enabled(kind) {
            let stats = device.delivery_stats(kind)?;
            info!(
                %kind,
                published = stats.published,
                adopted = stats.adopted,
                dropped = stats.dropped,
                "stream totals"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("argus=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let settings = load_settings();
    info!(?settings, "starting synthetic capture");

    let mut device = demo_device();
    enable_from(&mut device, StreamKind::Depth, &settings.depth)?;
    enable_from(&mut device, StreamKind::Color, &settings.color)?;
    device.configure_enabled_streams()?;
    device.start_capture()?;

    let run = Duration::from_secs(settings.run_seconds);
    let consumer = tokio::task::spawn_blocking(move || consume(device, run));

    tokio::select! {
        result = consumer => result??,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    info!("shutting down");
    Ok(())
}

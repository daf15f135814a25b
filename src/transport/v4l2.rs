//! V4L2-backed endpoint for Linux video devices

use std::thread::{self, JoinHandle};

use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device as VideoDevice, FourCC};

use crate::stream::mode::PixelFormat;
use crate::transport::{Endpoint, EndpointMode, FrameSink, TransportError};

/// One V4L2 capture node exposed as a device sub-endpoint
pub struct V4l2Endpoint {
    path: String,
    buffer_count: u32,
    device: Option<VideoDevice>,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: flume::Sender<()>,
    handle: JoinHandle<()>,
}

impl V4l2Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            buffer_count: 4,
            device: None,
            worker: None,
        }
    }

    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    fn configure(device: &VideoDevice, mode: &EndpointMode) -> Result<(), TransportError> {
        let fourcc = fourcc_for(mode.format)?;
        let mut format = v4l::Format::new(mode.width, mode.height, fourcc);
        format = Capture::set_format(device, &format)?;

        // the driver may substitute a different format; reject silently
        // degraded configurations
        if format.fourcc != fourcc || format.width != mode.width || format.height != mode.height {
            return Err(TransportError::Stream(format!(
                "device rejected {:?} at {}x{}",
                mode.format, mode.width, mode.height
            )));
        }

        let params = v4l::video::capture::Parameters::with_fps(mode.fps);
        Capture::set_params(device, &params)?;
        Ok(())
    }
}

fn fourcc_for(format: PixelFormat) -> Result<FourCC, TransportError> {
    match format {
        PixelFormat::Yuyv => Ok(FourCC::new(b"YUYV")),
        PixelFormat::Rgb8 => Ok(FourCC::new(b"RGB3")),
        PixelFormat::Z16 => Ok(FourCC::new(b"Z16 ")),
        PixelFormat::Y8 => Ok(FourCC::new(b"GREY")),
        PixelFormat::Any => Err(TransportError::Stream(
            "wildcard format reached the transport".into(),
        )),
    }
}

impl Endpoint for V4l2Endpoint {
    fn open(&mut self) -> Result<(), TransportError> {
        let device = VideoDevice::with_path(&self.path)?;

        let caps = device.query_caps()?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(TransportError::Open(format!(
                "{} does not support video capture",
                self.path
            )));
        }
        info!(path = %self.path, card = %caps.card, "opened V4L2 endpoint");

        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.worker.is_some() {
            self.stop_streaming()?;
        }
        self.device = None;
        Ok(())
    }

    fn start_streaming(
        &mut self,
        mode: EndpointMode,
        mut sink: FrameSink,
    ) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::Stream("already streaming".into()));
        }
        let device = self.device.take().ok_or(TransportError::Closed)?;

        if let Err(err) = Self::configure(&device, &mode) {
            self.device = Some(device);
            return Err(err);
        }

        let buffer_count = self.buffer_count;
        let path = self.path.clone();
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::spawn(move || {
            let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)
            {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(path = %path, error = %err, "failed to map capture buffers");
                    return;
                }
            };
            loop {
                match stop_rx.try_recv() {
                    Err(flume::TryRecvError::Empty) => {}
                    Ok(()) | Err(flume::TryRecvError::Disconnected) => break,
                }
                match CaptureStream::next(&mut stream) {
                    Ok((data, _meta)) => sink(data),
                    Err(err) => {
                        warn!(path = %path, error = %err, "capture read failed");
                        break;
                    }
                }
            }
        });

        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), TransportError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = worker.stop_tx.send(());
        worker
            .handle
            .join()
            .map_err(|_| TransportError::Stream("capture worker panicked".into()))
    }
}

impl Drop for V4l2Endpoint {
    fn drop(&mut self) {
        let _ = self.stop_streaming();
    }
}

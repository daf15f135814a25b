//! Transport collaborator seam
//!
//! A device is wired to a set of hardware sub-endpoints at construction.
//! Each endpoint is one independently streamable data path; the device
//! session drives it through the `Endpoint` trait and receives raw frames
//! through a registered sink callback.

pub mod synthetic;

#[cfg(feature = "v4l2")]
pub mod v4l2;

use thiserror::Error;

use crate::stream::mode::{PixelFormat, StreamMode};

pub use synthetic::SyntheticEndpoint;

#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Endpoint;

/// Transport-side failures, wrapped into `DeviceError::Hardware` by the
/// device session
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open endpoint: {0}")]
    Open(String),

    #[error("endpoint is not open")]
    Closed,

    #[error("streaming error: {0}")]
    Stream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Raw capture parameters handed to an endpoint when streaming starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMode {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
}

impl EndpointMode {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

impl From<StreamMode> for EndpointMode {
    fn from(mode: StreamMode) -> Self {
        Self {
            width: mode.width,
            height: mode.height,
            format: mode.format,
            fps: mode.fps,
        }
    }
}

/// Frame delivery callback registered by the device session. Invoked from
/// the endpoint's producer context with one raw frame; expected to complete
/// quickly (it only copies into back slots and publishes).
pub type FrameSink = Box<dyn FnMut(&[u8]) + Send>;

/// One hardware sub-endpoint as seen by the device session.
///
/// Lifecycle: `open` → `start_streaming` → `stop_streaming` → `close`.
/// `stop_streaming` must quiesce the producer context before returning, so
/// no sink invocation happens after it returns.
pub trait Endpoint: Send {
    fn open(&mut self) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    fn start_streaming(&mut self, mode: EndpointMode, sink: FrameSink)
        -> Result<(), TransportError>;

    fn stop_streaming(&mut self) -> Result<(), TransportError>;
}

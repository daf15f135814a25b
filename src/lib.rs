//! Multi-stream camera device core
//!
//! Negotiates per-stream configuration requests against a device's declared
//! capability table and hands frames from transport-driven producer threads
//! to a synchronous consumer API through per-stream triple buffers. The
//! producer side is never blocked by a slow consumer, and the consumer only
//! ever observes complete frames.

pub mod device;
pub mod error;
pub mod stream;
pub mod transport;

pub use device::caps::{DeviceInfo, Intrinsics, ModeEntry};
pub use device::controls::{Controls, DeviceOption, NullControls};
pub use device::Device;
pub use error::DeviceError;
pub use stream::mode::{PixelFormat, Preset, StreamKind, StreamMode, StreamRequest};
pub use stream::triple::{DeliveryStats, FrameWriter, TripleBuffer};
pub use transport::{Endpoint, EndpointMode, FrameSink, SyntheticEndpoint, TransportError};

#[cfg(feature = "v4l2")]
pub use transport::V4l2Endpoint;

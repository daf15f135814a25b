pub mod mode;
pub mod session;
pub mod triple;

pub use mode::{PixelFormat, Preset, StreamKind, StreamMode, StreamRequest};
pub use session::StreamSession;
pub use triple::{DeliveryStats, FrameWriter, TripleBuffer};

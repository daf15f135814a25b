use crate::stream::mode::{StreamKind, StreamMode};
use crate::stream::triple::TripleBuffer;

/// A live binding of one stream kind to its negotiated mode and triple
/// buffer. Exists from a successful `configure_enabled_streams` until the
/// stream is disabled or reconfigured; owned exclusively by the device
/// session.
pub struct StreamSession {
    kind: StreamKind,
    mode: StreamMode,
    endpoint: usize,
    buffer: TripleBuffer,
}

impl StreamSession {
    pub(crate) fn new(kind: StreamKind, mode: StreamMode, endpoint: usize) -> Self {
        Self {
            kind,
            mode,
            endpoint,
            buffer: TripleBuffer::with_frame_len(mode.frame_len()),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Index of the hardware sub-endpoint that produces this stream
    pub fn endpoint(&self) -> usize {
        self.endpoint
    }

    pub fn buffer(&self) -> &TripleBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut TripleBuffer {
        &mut self.buffer
    }
}

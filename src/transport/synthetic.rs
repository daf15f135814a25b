//! Synthetic endpoint producing test-pattern frames on a worker thread
//!
//! Stands in for real hardware in tests and the demo binary: frames are
//! emitted at the negotiated rate, filled with a rolling pattern byte.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::transport::{Endpoint, EndpointMode, FrameSink, TransportError};

pub struct SyntheticEndpoint {
    open: bool,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: flume::Sender<()>,
    handle: JoinHandle<()>,
}

impl SyntheticEndpoint {
    pub fn new() -> Self {
        Self {
            open: false,
            worker: None,
        }
    }
}

impl Default for SyntheticEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for SyntheticEndpoint {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.worker.is_some() {
            self.stop_streaming()?;
        }
        self.open = false;
        Ok(())
    }

    fn start_streaming(
        &mut self,
        mode: EndpointMode,
        mut sink: FrameSink,
    ) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        if self.worker.is_some() {
            return Err(TransportError::Stream("already streaming".into()));
        }

        let frame_len = mode.frame_len();
        let interval = if mode.fps == 0 {
            Duration::from_millis(33)
        } else {
            Duration::from_secs(1) / mode.fps
        };
        debug!(?mode, frame_len, "starting synthetic frame worker");

        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::spawn(move || {
            let mut scratch = vec![0u8; frame_len];
            let mut tick: u8 = 0;
            loop {
                // the pacing sleep doubles as the stop signal wait
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
                    Err(flume::RecvTimeoutError::Timeout) => {}
                }
                tick = tick.wrapping_add(1);
                scratch.fill(tick);
                sink(&scratch);
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
            .map_err(|_| TransportError::Stream("frame worker panicked".into()))
    }
}

impl Drop for SyntheticEndpoint {
    fn drop(&mut self) {
        let _ = self.stop_streaming();
    }
}

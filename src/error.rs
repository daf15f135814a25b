//! Error taxonomy for the device core

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the consumer-facing device API.
///
/// Dropped frames are not errors; a consumer slower than the producer
/// silently loses intermediate frames.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The requested mode, preset or option is not supported by the
    /// device's capability table. Reported at the call that made the
    /// request, never deferred.
    #[error("unsupported configuration: {0}")]
    Configuration(String),

    /// The operation is invalid in the current lifecycle state.
    #[error("invalid operation: {0}")]
    State(&'static str),

    /// The transport failed while opening, starting or stopping a
    /// sub-endpoint. Partially started endpoints are rolled back before
    /// this propagates.
    #[error("hardware failure on {context}: {source}")]
    Hardware {
        context: String,
        #[source]
        source: TransportError,
    },

    /// `wait_all_streams` exceeded its bound.
    #[error("timed out after {0:?} waiting for streams")]
    Timeout(Duration),
}

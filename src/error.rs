//! Error types for the sort, scan and histogram primitives.

use thiserror::Error;

/// Result type alias using [`SortError`].
pub type Result<T> = std::result::Result<T, SortError>;

/// Everything that can stop a device call from completing.
///
/// There is no partial-success mode: when any of these is returned the
/// contents of the buffers involved are undefined.
#[derive(Debug, Error)]
pub enum SortError {
    /// No adapter matched the requested backends and power preference.
    #[error("no compatible GPU adapter found")]
    AdapterNotFound,

    /// The adapter refused to create a device.
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Input or scratch dimensions exceed a device limit.
    #[error("{resource} needs {required}, device limit is {limit}")]
    Capacity {
        /// The limited resource
        resource: &'static str,
        /// Amount the call needs
        required: u64,
        /// Amount the device reports
        limit: u64,
    },

    /// Caller-supplied argument the kernels cannot work with.
    #[error("invalid argument '{arg}': {reason}")]
    Precondition {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// The device reported a validation or out-of-memory error while
    /// recording or executing the kernels.
    #[error("GPU execution failed: {0}")]
    Execution(String),

    /// Mapping a staging buffer for readback failed.
    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
}

impl SortError {
    pub(crate) fn precondition(arg: &'static str, reason: impl Into<String>) -> Self {
        SortError::Precondition {
            arg,
            reason: reason.into(),
        }
    }
}

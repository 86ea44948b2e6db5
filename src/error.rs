//! Error taxonomy shared by every layer of the lighting core.

use axerrno::{AxError, LinuxError};
use thiserror::Error;

/// Errors returned by the registry, the attribute codecs and backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LightsError {
    /// Malformed wire data, bad length or a disallowed state-type combination.
    #[error("invalid argument")]
    InvalidArgument,
    /// Unknown mode name, attribute node or interface.
    #[error("not found")]
    NotFound,
    /// An interface or attribute with the same name is already live.
    #[error("already exists")]
    AlreadyExists,
    /// The minor number space is exhausted.
    #[error("no free minor numbers")]
    Busy,
    /// A variable-length buffer could not be allocated.
    #[error("out of memory")]
    OutOfMemory,
    /// Two backends declare the same mode id under different names.
    #[error("conflicting mode declaration")]
    Conflict,
    /// Bytes could not be transferred to or from the caller.
    #[error("bad address")]
    IoFault,
    /// The attribute does not support the requested direction.
    #[error("operation not supported")]
    Unsupported,
    /// The backend refused the request in its current state.
    #[error("permission denied")]
    PermissionDenied,
}

/// Result type used throughout the crate.
pub type LightsResult<T = ()> = Result<T, LightsError>;

impl LightsError {
    /// Negative Linux errno, the status a failed node read/write reports.
    pub fn errno(self) -> i32 {
        -LinuxError::from(AxError::from(self)).code()
    }
}

impl From<LightsError> for AxError {
    fn from(err: LightsError) -> Self {
        match err {
            LightsError::InvalidArgument => AxError::InvalidInput,
            LightsError::NotFound => AxError::NotFound,
            LightsError::AlreadyExists | LightsError::Conflict => AxError::AlreadyExists,
            LightsError::Busy => AxError::ResourceBusy,
            LightsError::OutOfMemory => AxError::NoMemory,
            LightsError::IoFault => AxError::BadAddress,
            LightsError::Unsupported => AxError::Unsupported,
            LightsError::PermissionDenied => AxError::PermissionDenied,
        }
    }
}

impl From<alloc::collections::TryReserveError> for LightsError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        LightsError::OutOfMemory
    }
}

//! Errors raised while admitting objects into batch buffers.

use thiserror::Error;
use crate::frame::PixelFormat;
use crate::backend::ColorMode;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BatchingError>;

/// Broad classification of a [`BatchingError`].
///
/// None of the kinds are retried by this crate; the classification only tells
/// the caller what to drop (the stream, the batch, or the whole pipeline run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stream cannot be processed with the current setup.
    Configuration,
    /// A single object's transform failed; its batch must be abandoned.
    Transform,
    /// The ticketing protocol was misused.
    Protocol,
}

#[derive(Debug, Error)]
pub enum BatchingError {
    #[error("can not handle frame with pixel format {0:?}")]
    UnsupportedPixelFormat(PixelFormat),

    #[error(
        "resize convert operator was initialized for {expected:?} but frame requires {found:?}; \
         streams with mixed pixel formats can not use device preprocessing"
    )]
    ColorModeMismatch { expected: ColorMode, found: ColorMode },

    #[error("slot pool already initialized with {existing}, refusing to reinitialize with {requested}")]
    ReinitMismatch { existing: String, requested: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model declares no input shape at index {0}")]
    MissingInputShape(usize),

    #[error("frame has no plane {index} (frame has {available})")]
    MissingPlane { index: usize, available: usize },

    #[error("plane {index} is not resident in {expected} memory")]
    WrongPlaneMemory { index: usize, expected: &'static str },

    #[error("scaler failed, error code: {0}")]
    TransformFailed(i32),

    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    #[error("batch index {batch_idx} out of range for buffer of batch size {batch_size}")]
    BatchIndexOutOfRange { batch_idx: u32, batch_size: u32 },

    #[error("stale ticket for slot {slot} generation {generation}")]
    StaleTicket { slot: usize, generation: u64 },

    #[error("ticket was issued by a different pool")]
    ForeignTicket,

    #[error("ticketing protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("executor shut down before the task completed")]
    ExecutorClosed,
}

impl BatchingError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchingError::UnsupportedPixelFormat(_)
            | BatchingError::ColorModeMismatch { .. }
            | BatchingError::ReinitMismatch { .. }
            | BatchingError::InvalidConfig(_)
            | BatchingError::MissingInputShape(_)
            | BatchingError::MissingPlane { .. }
            | BatchingError::WrongPlaneMemory { .. } => ErrorKind::Configuration,
            BatchingError::TransformFailed(_)
            | BatchingError::Preprocess(_)
            | BatchingError::BatchIndexOutOfRange { .. } => ErrorKind::Transform,
            BatchingError::StaleTicket { .. }
            | BatchingError::ForeignTicket
            | BatchingError::ProtocolViolation(_)
            | BatchingError::ExecutorClosed => ErrorKind::Protocol,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            BatchingError::UnsupportedPixelFormat(PixelFormat::Rgb24).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(BatchingError::TransformFailed(-3).kind(), ErrorKind::Transform);
        assert_eq!(
            BatchingError::StaleTicket { slot: 0, generation: 1 }.kind(),
            ErrorKind::Protocol
        );
        assert!(BatchingError::InvalidConfig("x".into()).is_configuration());
    }

    #[test]
    fn test_transform_failure_message_carries_code() {
        let err = BatchingError::TransformFailed(7);
        assert_eq!(err.to_string(), "scaler failed, error code: 7");
    }
}

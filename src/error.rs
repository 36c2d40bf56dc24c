//! Error types for the NAS search space

use thiserror::Error;

/// Result type alias for search-space operations
pub type Result<T> = std::result::Result<T, NasError>;

/// Main error type for search-space decoding and network construction
#[derive(Error, Debug)]
pub enum NasError {
    #[error("block number must be in [1, {max}), but received block number {block_num}")]
    InvalidBlockNum { block_num: usize, max: usize },

    #[error(
        "output_size must EQUAL to input_size / (2^block_num), \
         but received input_size={input_size}, output_size={output_size}, \
         block_num={block_num} (network produced spatial size {actual})"
    )]
    OutputSizeMismatch {
        input_size: usize,
        output_size: usize,
        block_num: usize,
        actual: usize,
    },

    #[error("token vector must have {expected} entries, got {actual}")]
    TokenLength { expected: usize, actual: usize },

    #[error("token {position} = {value} is out of range, must be below {bound}")]
    TokenOutOfRange {
        position: usize,
        value: usize,
        bound: usize,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Array shape error: {0}")]
    ArrayShape(#[from] ndarray::ShapeError),

    #[error("parameter {name} already exists with shape {existing:?}, requested {requested:?}")]
    ParamConflict {
        name: String,
        existing: Vec<usize>,
        requested: Vec<usize>,
    },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unknown search space: {0}")]
    UnknownSearchSpace(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for NasError {
    fn from(err: serde_json::Error) -> Self {
        NasError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NasError::InvalidBlockNum { block_num: 7, max: 7 };
        assert_eq!(
            err.to_string(),
            "block number must be in [1, 7), but received block number 7"
        );
    }

    #[test]
    fn test_output_mismatch_names_sizes() {
        let err = NasError::OutputSizeMismatch {
            input_size: 224,
            output_size: 224,
            block_num: 5,
            actual: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("input_size=224"));
        assert!(msg.contains("block_num=5"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NasError = io_err.into();
        assert!(matches!(err, NasError::IoError(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: NasError = json_err.into();
        assert!(matches!(err, NasError::SerializationError(_)));
    }

    #[test]
    fn test_error_from_ndarray_keeps_kind() {
        let shape_err = ndarray::Array1::<f32>::zeros(4)
            .into_shape((3, 2))
            .unwrap_err();
        let err: NasError = shape_err.into();

        match err {
            NasError::ArrayShape(inner) => {
                assert_eq!(inner.kind(), ndarray::ErrorKind::IncompatibleShape);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

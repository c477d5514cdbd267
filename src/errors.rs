//! Centralized error handling for is2_data
//!
//! This module provides structured error types to replace generic `Box<dyn Error>`
//! returns, enabling better error context for notebook users reading failures
//! directly.

use std::fmt;

/// Main error type for is2_data operations
#[derive(Debug)]
pub enum Is2DataError {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Object storage (S3 bucket) errors
    ObjectStoreError(object_store::Error),

    /// Zarr store or metadata errors
    ZarrError(String),

    /// JSON metadata parsing errors
    JsonError(serde_json::Error),

    /// Date or timestamp parsing errors
    DateParseError(chrono::ParseError),

    /// A required enumeration of data files yielded zero entries
    NoDataFound { pattern: String },

    /// Variable not found in a dataset
    VariableNotFound { var: String },

    /// Attribute not found on a variable
    AttributeNotFound { var: String, attr: String },

    /// Dimension length disagreement between source files
    DimensionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// External transfer tool (e.g. gsutil) failure
    FetchError(String),

    /// Generic error for everything else
    Generic(String),
}

impl fmt::Display for Is2DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Is2DataError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            Is2DataError::IoError(e) => write!(f, "I/O error: {}", e),
            Is2DataError::ObjectStoreError(e) => write!(f, "Object storage error: {}", e),
            Is2DataError::ZarrError(msg) => write!(f, "Zarr error: {}", msg),
            Is2DataError::JsonError(e) => write!(f, "JSON metadata error: {}", e),
            Is2DataError::DateParseError(e) => write!(f, "Date parse error: {}", e),
            Is2DataError::NoDataFound { pattern } => {
                write!(f, "No data files found matching '{}'", pattern)
            }
            Is2DataError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in dataset", var)
            }
            Is2DataError::AttributeNotFound { var, attr } => {
                write!(f, "Attribute '{}' not found on variable '{}'", attr, var)
            }
            Is2DataError::DimensionMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "Dimension '{}' length mismatch: expected {}, found {}",
                name, expected, found
            ),
            Is2DataError::ArrayError(e) => write!(f, "Array error: {}", e),
            Is2DataError::FetchError(msg) => write!(f, "Transfer tool error: {}", msg),
            Is2DataError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Is2DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Is2DataError::NetCDFError(e) => Some(e),
            Is2DataError::IoError(e) => Some(e),
            Is2DataError::ObjectStoreError(e) => Some(e),
            Is2DataError::JsonError(e) => Some(e),
            Is2DataError::DateParseError(e) => Some(e),
            Is2DataError::ArrayError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for Is2DataError {
    fn from(error: netcdf::Error) -> Self {
        Is2DataError::NetCDFError(error)
    }
}

impl From<std::io::Error> for Is2DataError {
    fn from(error: std::io::Error) -> Self {
        Is2DataError::IoError(error)
    }
}

impl From<object_store::Error> for Is2DataError {
    fn from(error: object_store::Error) -> Self {
        Is2DataError::ObjectStoreError(error)
    }
}

impl From<serde_json::Error> for Is2DataError {
    fn from(error: serde_json::Error) -> Self {
        Is2DataError::JsonError(error)
    }
}

impl From<chrono::ParseError> for Is2DataError {
    fn from(error: chrono::ParseError) -> Self {
        Is2DataError::DateParseError(error)
    }
}

impl From<ndarray::ShapeError> for Is2DataError {
    fn from(error: ndarray::ShapeError) -> Self {
        Is2DataError::ArrayError(error)
    }
}

impl From<String> for Is2DataError {
    fn from(error: String) -> Self {
        Is2DataError::Generic(error)
    }
}

impl From<&str> for Is2DataError {
    fn from(error: &str) -> Self {
        Is2DataError::Generic(error.to_string())
    }
}

/// Result type alias for is2_data operations
pub type Result<T> = std::result::Result<T, Is2DataError>;

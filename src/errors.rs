//! Centralized error handling for obs_prep
//!
//! Failures from the storage, catalog, array and NetCDF layers are wrapped
//! without translation so callers see the original cause through
//! [`std::error::Error::source`].

use std::fmt;

/// Main error type for obs_prep operations
#[derive(Debug)]
pub enum ObsPrepError {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Remote or local object store errors
    StoreError(object_store::Error),

    /// HTTP errors from the catalog or token service
    HttpError(reqwest::Error),

    /// Malformed JSON documents (Zarr metadata, STAC responses)
    JsonError(serde_json::Error),

    /// Zarr array open/decode errors
    ZarrError(String),

    /// Variable not found in a dataset
    VariableNotFound { var: String },

    /// Dimension not found in a dataset or variable
    DimensionNotFound { var: String, dim: String },

    /// Invalid selection (non-monotonic index, bad range, unsupported layout)
    InvalidSelection { message: String },

    /// CF time units or calendar dates that cannot be decoded or converted
    TimeDecodeError(String),

    /// Resampling frequency that cannot be parsed or is not fixed
    InvalidFrequency { frequency: String },

    /// STAC catalog lookup errors (missing collection asset, bad href)
    CatalogError(String),

    /// Generic error for anything else
    Generic(String),
}

impl fmt::Display for ObsPrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObsPrepError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            ObsPrepError::IoError(e) => write!(f, "I/O error: {}", e),
            ObsPrepError::ArrayError(e) => write!(f, "Array error: {}", e),
            ObsPrepError::StoreError(e) => write!(f, "Object store error: {}", e),
            ObsPrepError::HttpError(e) => write!(f, "HTTP error: {}", e),
            ObsPrepError::JsonError(e) => write!(f, "JSON error: {}", e),
            ObsPrepError::ZarrError(msg) => write!(f, "Zarr error: {}", msg),
            ObsPrepError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in dataset", var)
            }
            ObsPrepError::DimensionNotFound { var, dim } => {
                write!(f, "Dimension '{}' not found in '{}'", dim, var)
            }
            ObsPrepError::InvalidSelection { message } => {
                write!(f, "Invalid selection: {}", message)
            }
            ObsPrepError::TimeDecodeError(msg) => write!(f, "Time decoding error: {}", msg),
            ObsPrepError::InvalidFrequency { frequency } => {
                write!(f, "Invalid or non-fixed frequency '{}'", frequency)
            }
            ObsPrepError::CatalogError(msg) => write!(f, "Catalog error: {}", msg),
            ObsPrepError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ObsPrepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObsPrepError::NetCDFError(e) => Some(e),
            ObsPrepError::IoError(e) => Some(e),
            ObsPrepError::ArrayError(e) => Some(e),
            ObsPrepError::StoreError(e) => Some(e),
            ObsPrepError::HttpError(e) => Some(e),
            ObsPrepError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for ObsPrepError {
    fn from(error: netcdf::Error) -> Self {
        ObsPrepError::NetCDFError(error)
    }
}

impl From<std::io::Error> for ObsPrepError {
    fn from(error: std::io::Error) -> Self {
        ObsPrepError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for ObsPrepError {
    fn from(error: ndarray::ShapeError) -> Self {
        ObsPrepError::ArrayError(error)
    }
}

impl From<object_store::Error> for ObsPrepError {
    fn from(error: object_store::Error) -> Self {
        ObsPrepError::StoreError(error)
    }
}

impl From<reqwest::Error> for ObsPrepError {
    fn from(error: reqwest::Error) -> Self {
        ObsPrepError::HttpError(error)
    }
}

impl From<serde_json::Error> for ObsPrepError {
    fn from(error: serde_json::Error) -> Self {
        ObsPrepError::JsonError(error)
    }
}

impl From<String> for ObsPrepError {
    fn from(error: String) -> Self {
        ObsPrepError::Generic(error)
    }
}

impl From<&str> for ObsPrepError {
    fn from(error: &str) -> Self {
        ObsPrepError::Generic(error.to_string())
    }
}

/// Result type alias for obs_prep operations
pub type Result<T> = std::result::Result<T, ObsPrepError>;

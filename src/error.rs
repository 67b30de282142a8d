//! Error taxonomy for coverage operations.
//!
//! Parameter problems are reported before any computation
//! starts. Geometric failures are reported under the
//! category of the operation that hit them (crop, scale,
//! subsample or reproject), with the underlying transform or
//! engine failure attached as the error source.

use thiserror::Error;

use crate::engine::Primitive;
use crate::parameters::ParameterKind;

/// Failures of the math-transform layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The transform has no inverse (singular matrix, or a
    /// general transform without an inverse evaluator).
    #[error("transform is not invertible")]
    NonInvertible,

    /// The requested axes can't be separated from the
    /// remaining dimensions of the transform.
    #[error("transform is not separable along axes ({0}, {1})")]
    NonSeparable(usize, usize),

    /// Dimensions of two chained transforms, or of a point
    /// and a transform, don't agree.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// No coordinate operation is known between two CRS.
    #[error("no coordinate operation from {from} to {to}")]
    NoOperation { from: String, to: String },

    /// A reprojection was requested but the CRS of the
    /// coverage is unknown.
    #[error("coordinate reference system is unknown")]
    UnknownCrs,
}

/// Failures reported by a [`RasterEngine`][crate::engine::RasterEngine].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The primitive was invoked with arguments it can't
    /// process.
    #[error("{primitive}: {message}")]
    InvalidArgument { primitive: Primitive, message: String },

    /// The primitive would produce an image without pixels.
    #[error("{primitive}: empty output image")]
    EmptyOutput { primitive: Primitive },
}

impl EngineError {
    pub fn invalid_argument(primitive: Primitive, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            primitive,
            message: message.into(),
        }
    }
}

/// Lower-level failure wrapped by an operation error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureCause {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors produced by coverage operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    /// No operation is registered under this name.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    /// The operation has no parameter with this name.
    #[error("operation {operation} has no parameter `{name}`")]
    UnknownParameter { operation: String, name: String },

    /// A mandatory parameter was not set.
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),

    /// A parameter was set with a value of the wrong kind.
    #[error("parameter `{name}` expects {expected}, found {found}")]
    InvalidParameterType {
        name: String,
        expected: ParameterKind,
        found: ParameterKind,
    },

    /// A parameter value is of the right kind, but out of range.
    #[error("invalid value for parameter `{name}`: {reason}")]
    InvalidParameterValue { name: String, reason: String },

    /// The CRS of a requested envelope doesn't match the CRS
    /// of the coverage.
    #[error("CRS mismatch: coverage is in {expected}, request is in {found}")]
    CrsMismatch { expected: String, found: String },

    /// The parts of a coverage don't agree with each other.
    #[error("invalid coverage: {0}")]
    InvalidCoverage(String),

    /// An [`EngineConfig`][crate::config::EngineConfig] field is
    /// out of range.
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("cannot crop coverage: {0}")]
    CannotCrop(#[source] FailureCause),

    #[error("cannot scale coverage: {0}")]
    CannotScale(#[source] FailureCause),

    #[error("cannot subsample coverage: {0}")]
    CannotSubsample(#[source] FailureCause),

    #[error("cannot reproject coverage: {0}")]
    CannotReproject(#[source] FailureCause),
}

impl CoverageError {
    /// Create a CannotCrop error.
    pub fn crop(cause: impl Into<FailureCause>) -> Self {
        Self::CannotCrop(cause.into())
    }

    /// Create a CannotScale error.
    pub fn scale(cause: impl Into<FailureCause>) -> Self {
        Self::CannotScale(cause.into())
    }

    /// Create a CannotSubsample error.
    pub fn subsample(cause: impl Into<FailureCause>) -> Self {
        Self::CannotSubsample(cause.into())
    }

    /// Create a CannotReproject error.
    pub fn reproject(cause: impl Into<FailureCause>) -> Self {
        Self::CannotReproject(cause.into())
    }

    /// Create an InvalidParameterValue error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameterValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidCoverage error.
    pub fn invalid_coverage(msg: impl Into<String>) -> Self {
        Self::InvalidCoverage(msg.into())
    }
}

/// Result type for coverage operations.
pub type Result<T> = std::result::Result<T, CoverageError>;

//! Coordinate reference systems and the coordinate operations
//! between them.
//!
//! CRS definitions themselves are opaque to this crate: a
//! [`Crs`] is an identifier plus a dimension, with optional
//! descriptive metadata that is ignored when comparing. The
//! concrete transforms between two CRS come from a
//! [`CoordinateOperationFactory`].

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde_derive::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::transform::MathTransform;

/// A coordinate reference system, identified by an authority
/// code such as `EPSG:4326`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    id: String,
    dimension: usize,
    name: Option<String>,
}

impl Crs {
    pub fn new(id: impl Into<String>, dimension: usize) -> Self {
        Crs {
            id: id.into(),
            dimension,
            name: None,
        }
    }

    /// Attach a human readable name. Names are metadata: they
    /// don't take part in [`equals_ignore_metadata`][Crs::equals_ignore_metadata].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Compares identifiers (case-insensitively) and
    /// dimensions only.
    pub fn equals_ignore_metadata(&self, other: &Crs) -> bool {
        self.dimension == other.dimension && self.id.eq_ignore_ascii_case(&other.id)
    }

    fn key(&self) -> (String, usize) {
        (self.id.to_ascii_uppercase(), self.dimension)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Metadata-insensitive comparison of optional CRS. Two
/// unknown CRS are considered equal.
pub fn same_crs(a: Option<&Crs>, b: Option<&Crs>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.equals_ignore_metadata(b),
        (None, None) => true,
        _ => false,
    }
}

/// Source of coordinate operations between two CRS.
pub trait CoordinateOperationFactory: Send + Sync {
    /// Transform mapping coordinates in `source` to `target`.
    fn create_operation(&self, source: &Crs, target: &Crs) -> Result<MathTransform, TransformError>;
}

/// A [`CoordinateOperationFactory`] backed by explicitly
/// registered transforms. Registering an invertible transform
/// also registers its inverse for the opposite direction.
#[derive(Default)]
pub struct OperationRegistry {
    operations: RwLock<HashMap<((String, usize), (String, usize)), MathTransform>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register `transform` from `source` to `target`.
    pub fn register(
        &self,
        source: &Crs,
        target: &Crs,
        transform: MathTransform,
    ) -> Result<(), TransformError> {
        if transform.source_dimension() != source.dimension() {
            return Err(TransformError::DimensionMismatch {
                expected: source.dimension(),
                found: transform.source_dimension(),
            });
        }
        if transform.target_dimension() != target.dimension() {
            return Err(TransformError::DimensionMismatch {
                expected: target.dimension(),
                found: transform.target_dimension(),
            });
        }

        let inverse = transform.inverse().ok();
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(inverse) = inverse {
            ops.entry((target.key(), source.key())).or_insert(inverse);
        }
        ops.insert((source.key(), target.key()), transform);
        Ok(())
    }
}

impl CoordinateOperationFactory for OperationRegistry {
    fn create_operation(&self, source: &Crs, target: &Crs) -> Result<MathTransform, TransformError> {
        if source.equals_ignore_metadata(target) {
            return Ok(MathTransform::identity(source.dimension()));
        }
        let ops = self
            .operations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ops.get(&(source.key(), target.key()))
            .cloned()
            .ok_or_else(|| TransformError::NoOperation {
                from: source.to_string(),
                to: target.to_string(),
            })
    }
}

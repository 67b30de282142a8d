//! Named, typed and validated operation parameters.
//!
//! Every operation publishes a static [`OperationDescriptor`]
//! listing its parameters. A [`ParameterGroup`] is created
//! fresh from a descriptor for each invocation, checks names
//! (case-insensitively) and value kinds as they are set, and
//! checks that mandatory parameters are present before the
//! operation runs.

use std::fmt;
use std::sync::Arc;

use crate::coverage::Coverage;
use crate::crs::Crs;
use crate::error::{CoverageError, Result};
use crate::geometry::Envelope;
use crate::grid::GridGeometry;
use crate::interpolation::{BorderExtender, Interpolation};

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Coverage,
    Crs,
    GridGeometry,
    Envelope,
    Interpolation,
    BorderExtender,
    Float,
    Integer,
    FloatArray,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::Coverage => "a coverage",
            ParameterKind::Crs => "a coordinate reference system",
            ParameterKind::GridGeometry => "a grid geometry",
            ParameterKind::Envelope => "an envelope",
            ParameterKind::Interpolation => "an interpolation",
            ParameterKind::BorderExtender => "a border extender",
            ParameterKind::Float => "a number",
            ParameterKind::Integer => "an integer",
            ParameterKind::FloatArray => "an array of numbers",
        };
        f.write_str(name)
    }
}

/// Value of a parameter.
#[derive(Debug, Clone)]
pub enum ParameterValue {
    Coverage(Arc<Coverage>),
    Crs(Crs),
    GridGeometry(GridGeometry),
    Envelope(Envelope),
    Interpolation(Interpolation),
    BorderExtender(BorderExtender),
    Float(f64),
    Integer(i64),
    FloatArray(Vec<f64>),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Coverage(_) => ParameterKind::Coverage,
            ParameterValue::Crs(_) => ParameterKind::Crs,
            ParameterValue::GridGeometry(_) => ParameterKind::GridGeometry,
            ParameterValue::Envelope(_) => ParameterKind::Envelope,
            ParameterValue::Interpolation(_) => ParameterKind::Interpolation,
            ParameterValue::BorderExtender(_) => ParameterKind::BorderExtender,
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Integer(_) => ParameterKind::Integer,
            ParameterValue::FloatArray(_) => ParameterKind::FloatArray,
        }
    }

    /// Convert to `kind` where lossless: integers are
    /// accepted as floats.
    fn coerce(self, kind: ParameterKind) -> std::result::Result<Self, Self> {
        match (self, kind) {
            (ParameterValue::Integer(i), ParameterKind::Float) => Ok(ParameterValue::Float(i as f64)),
            (val, kind) if val.kind() == kind => Ok(val),
            (val, _) => Err(val),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParameterValue {
                fn from(val: $ty) -> Self {
                    ParameterValue::$variant(val)
                }
            }
        )*
    };
}

value_from! {
    Arc<Coverage> => Coverage,
    Crs => Crs,
    GridGeometry => GridGeometry,
    Envelope => Envelope,
    Interpolation => Interpolation,
    BorderExtender => BorderExtender,
    f64 => Float,
    i64 => Integer,
    Vec<f64> => FloatArray,
}

/// Default of an optional parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Unset unless given; the operation picks a fallback.
    None,
    Float(f64),
    Integer(i64),
    FloatArray(&'static [f64]),
}

impl DefaultValue {
    fn value(&self) -> Option<ParameterValue> {
        match *self {
            DefaultValue::None => None,
            DefaultValue::Float(v) => Some(ParameterValue::Float(v)),
            DefaultValue::Integer(v) => Some(ParameterValue::Integer(v)),
            DefaultValue::FloatArray(v) => Some(ParameterValue::FloatArray(v.to_vec())),
        }
    }
}

/// Description of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub default: DefaultValue,
}

impl ParameterDescriptor {
    pub const fn required(name: &'static str, kind: ParameterKind) -> Self {
        ParameterDescriptor {
            name,
            kind,
            required: true,
            default: DefaultValue::None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParameterKind, default: DefaultValue) -> Self {
        ParameterDescriptor {
            name,
            kind,
            required: false,
            default,
        }
    }
}

/// Name of the source coverage parameter, present in every
/// operation.
pub const SOURCE: &str = "Source";

/// The source coverage parameter.
pub const SOURCE_PARAMETER: ParameterDescriptor = ParameterDescriptor::required(SOURCE, ParameterKind::Coverage);

/// Name and parameters of an operation.
#[derive(Debug, PartialEq)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub parameters: &'static [ParameterDescriptor],
}

impl OperationDescriptor {
    /// Index of the parameter named `name` (case-insensitive).
    fn position(&self, name: &str) -> Option<usize> {
        self.parameters
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn parameter(&self, name: &str) -> Option<&'static ParameterDescriptor> {
        let parameters: &'static [ParameterDescriptor] = self.parameters;
        self.position(name).map(|idx| &parameters[idx])
    }
}

/// Parameter values of one operation invocation.
#[derive(Debug, Clone)]
pub struct ParameterGroup {
    descriptor: &'static OperationDescriptor,
    values: Vec<Option<ParameterValue>>,
}

impl ParameterGroup {
    pub fn new(descriptor: &'static OperationDescriptor) -> Self {
        ParameterGroup {
            descriptor,
            values: vec![None; descriptor.parameters.len()],
        }
    }

    pub fn descriptor(&self) -> &'static OperationDescriptor {
        self.descriptor
    }

    /// Name of the operation the group is for.
    pub fn operation(&self) -> &'static str {
        self.descriptor.name
    }

    /// Set parameter `name`, checking that it exists and that
    /// the value is of the expected kind.
    pub fn set(&mut self, name: &str, value: impl Into<ParameterValue>) -> Result<&mut Self> {
        let idx = self
            .descriptor
            .position(name)
            .ok_or_else(|| CoverageError::UnknownParameter {
                operation: self.descriptor.name.to_string(),
                name: name.to_string(),
            })?;
        let param = &self.descriptor.parameters[idx];
        let value = value
            .into()
            .coerce(param.kind)
            .map_err(|val| CoverageError::InvalidParameterType {
                name: param.name.to_string(),
                expected: param.kind,
                found: val.kind(),
            })?;
        self.values[idx] = Some(value);
        Ok(self)
    }

    /// Builder-style [`set`][ParameterGroup::set].
    pub fn with(mut self, name: &str, value: impl Into<ParameterValue>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Shorthand to set the source coverage.
    pub fn with_source(self, source: Arc<Coverage>) -> Result<Self> {
        self.with(SOURCE, source)
    }

    /// Check that every required parameter is set.
    pub fn validate(&self) -> Result<()> {
        for (param, value) in self.descriptor.parameters.iter().zip(self.values.iter()) {
            if param.required && value.is_none() {
                return Err(CoverageError::MissingParameter(param.name.to_string()));
            }
        }
        Ok(())
    }

    /// Value of `name`, or its default.
    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        let idx = self.descriptor.position(name)?;
        self.values[idx]
            .clone()
            .or_else(|| self.descriptor.parameters[idx].default.value())
    }

    fn lookup(&self, name: &str, kind: ParameterKind) -> Result<Option<ParameterValue>> {
        let param = self
            .descriptor
            .parameter(name)
            .ok_or_else(|| CoverageError::UnknownParameter {
                operation: self.descriptor.name.to_string(),
                name: name.to_string(),
            })?;
        match self.get(name) {
            None if param.required => Err(CoverageError::MissingParameter(param.name.to_string())),
            None => Ok(None),
            Some(val) if val.kind() == kind => Ok(Some(val)),
            Some(val) => Err(CoverageError::InvalidParameterType {
                name: param.name.to_string(),
                expected: kind,
                found: val.kind(),
            }),
        }
    }

    /// The source coverage.
    pub fn source(&self) -> Result<Arc<Coverage>> {
        match self.lookup(SOURCE, ParameterKind::Coverage)? {
            Some(ParameterValue::Coverage(c)) => Ok(c),
            _ => Err(CoverageError::MissingParameter(SOURCE.to_string())),
        }
    }

    pub fn crs(&self, name: &str) -> Result<Option<Crs>> {
        Ok(match self.lookup(name, ParameterKind::Crs)? {
            Some(ParameterValue::Crs(v)) => Some(v),
            _ => None,
        })
    }

    pub fn grid_geometry(&self, name: &str) -> Result<Option<GridGeometry>> {
        Ok(match self.lookup(name, ParameterKind::GridGeometry)? {
            Some(ParameterValue::GridGeometry(v)) => Some(v),
            _ => None,
        })
    }

    pub fn envelope(&self, name: &str) -> Result<Option<Envelope>> {
        Ok(match self.lookup(name, ParameterKind::Envelope)? {
            Some(ParameterValue::Envelope(v)) => Some(v),
            _ => None,
        })
    }

    pub fn interpolation(&self, name: &str) -> Result<Option<Interpolation>> {
        Ok(match self.lookup(name, ParameterKind::Interpolation)? {
            Some(ParameterValue::Interpolation(v)) => Some(v),
            _ => None,
        })
    }

    pub fn border_extender(&self, name: &str) -> Result<Option<BorderExtender>> {
        Ok(match self.lookup(name, ParameterKind::BorderExtender)? {
            Some(ParameterValue::BorderExtender(v)) => Some(v),
            _ => None,
        })
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>> {
        Ok(match self.lookup(name, ParameterKind::Float)? {
            Some(ParameterValue::Float(v)) => Some(v),
            _ => None,
        })
    }

    pub fn integer(&self, name: &str) -> Result<Option<i64>> {
        Ok(match self.lookup(name, ParameterKind::Integer)? {
            Some(ParameterValue::Integer(v)) => Some(v),
            _ => None,
        })
    }

    pub fn float_array(&self, name: &str) -> Result<Option<Vec<f64>>> {
        Ok(match self.lookup(name, ParameterKind::FloatArray)? {
            Some(ParameterValue::FloatArray(v)) => Some(v),
            _ => None,
        })
    }
}

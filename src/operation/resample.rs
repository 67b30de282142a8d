use std::sync::Arc;

use super::{names, Context, Operation};
use crate::coverage::Coverage;
use crate::error::Result;
use crate::parameters::{
    DefaultValue, OperationDescriptor, ParameterDescriptor, ParameterGroup, ParameterKind, SOURCE_PARAMETER,
};
use crate::resampler::resample;

pub static RESAMPLE: OperationDescriptor = OperationDescriptor {
    name: "Resample",
    parameters: &[
        SOURCE_PARAMETER,
        ParameterDescriptor::optional(names::CRS, ParameterKind::Crs, DefaultValue::None),
        ParameterDescriptor::optional(names::GRID_GEOMETRY, ParameterKind::GridGeometry, DefaultValue::None),
        ParameterDescriptor::optional(names::INTERPOLATION_TYPE, ParameterKind::Interpolation, DefaultValue::None),
    ],
};

/// Reproject a coverage to a CRS and grid geometry.
#[derive(Debug, Default, Clone, Copy)]
pub struct Resample;

impl Operation for Resample {
    fn descriptor(&self) -> &'static OperationDescriptor {
        &RESAMPLE
    }

    fn execute(&self, params: &ParameterGroup, ctx: &Context) -> Result<Option<Arc<Coverage>>> {
        params.validate()?;
        let source = params.source()?;
        let crs = params.crs(names::CRS)?;
        let grid_geometry = params.grid_geometry(names::GRID_GEOMETRY)?;
        let interpolation = params
            .interpolation(names::INTERPOLATION_TYPE)?
            .unwrap_or(ctx.config.interpolation);
        resample(&source, crs.as_ref(), grid_geometry.as_ref(), interpolation, ctx).map(Some)
    }
}

use std::sync::Arc;

use tracing::debug;

use super::{names, Context, Operation};
use crate::coverage::{Coverage, Derivation};
use crate::engine::SubsampleParams;
use crate::error::{CoverageError, Result};
use crate::grid::GridGeometry;
use crate::interpolation::{BorderExtender, Interpolation};
use crate::parameters::{
    DefaultValue, OperationDescriptor, ParameterDescriptor, ParameterGroup, ParameterKind, SOURCE_PARAMETER,
};

pub static FILTERED_SUBSAMPLE: OperationDescriptor = OperationDescriptor {
    name: "FilteredSubsample",
    parameters: &[
        SOURCE_PARAMETER,
        ParameterDescriptor::optional(names::SCALE_X, ParameterKind::Integer, DefaultValue::Integer(1)),
        ParameterDescriptor::optional(names::SCALE_Y, ParameterKind::Integer, DefaultValue::Integer(1)),
        ParameterDescriptor::optional(names::FILTER, ParameterKind::FloatArray, DefaultValue::FloatArray(&[1.])),
        ParameterDescriptor::optional(names::INTERPOLATION, ParameterKind::Interpolation, DefaultValue::None),
        ParameterDescriptor::optional(names::BORDER_EXTENDER, ParameterKind::BorderExtender, DefaultValue::None),
    ],
};

/// Low-pass filter a coverage and keep one pixel out of
/// `scaleX * scaleY`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilteredSubsample;

impl Operation for FilteredSubsample {
    fn descriptor(&self) -> &'static OperationDescriptor {
        &FILTERED_SUBSAMPLE
    }

    fn execute(&self, params: &ParameterGroup, ctx: &Context) -> Result<Option<Arc<Coverage>>> {
        params.validate()?;
        let source = params.source()?;
        let x_factor = factor(names::SCALE_X, params.integer(names::SCALE_X)?.unwrap_or(1))?;
        let y_factor = factor(names::SCALE_Y, params.integer(names::SCALE_Y)?.unwrap_or(1))?;
        let quadrant = params
            .float_array(names::FILTER)?
            .unwrap_or_else(|| vec![1.]);
        let interpolation = params
            .interpolation(names::INTERPOLATION)?
            .unwrap_or(ctx.config.interpolation);
        let border = params
            .border_extender(names::BORDER_EXTENDER)?
            .unwrap_or(ctx.config.border_extender);

        let subsample = SubsampleParams {
            x_factor,
            y_factor,
            quadrant,
        };
        filtered_subsample(&source, &subsample, interpolation, border, ctx).map(Some)
    }
}

fn factor(name: &str, val: i64) -> Result<usize> {
    if val < 1 {
        return Err(CoverageError::invalid_value(name, format!("{} is not a positive integer", val)));
    }
    Ok(val as usize)
}

/// Subsample `source`. The result covers the same envelope
/// with fewer, larger pixels. Unit factors with the unit
/// filter return `source` itself.
pub fn filtered_subsample(
    source: &Arc<Coverage>,
    params: &SubsampleParams,
    interpolation: Interpolation,
    border: BorderExtender,
    ctx: &Context,
) -> Result<Arc<Coverage>> {
    factor(names::SCALE_X, params.x_factor as i64)?;
    factor(names::SCALE_Y, params.y_factor as i64)?;
    if params.quadrant.is_empty() || params.quadrant.iter().any(|w| !w.is_finite()) {
        return Err(CoverageError::invalid_value(
            names::FILTER,
            "filter must be a non-empty array of finite numbers",
        ));
    }
    if params.x_factor == 1 && params.y_factor == 1 && params.quadrant == [1.] {
        debug!(coverage = source.name(), "subsample: unit factors and filter");
        return Ok(source.clone());
    }

    debug!(coverage = source.name(), ?params, %interpolation, "filtered subsample");
    let image = ctx
        .engine
        .filtered_subsample(source.raster(), params, interpolation, border)
        .map_err(CoverageError::subsample)?;

    let range = source.grid_range().with_window(image.window());
    let reversed = GridGeometry::reversed_axes(source.grid_to_crs());
    let grid_to_crs = GridGeometry::fit_transform(&range, source.envelope(), &reversed);

    let coverage = Coverage::derived(
        source.name(),
        image,
        GridGeometry::new(range, grid_to_crs, source.crs().cloned()),
        source.sample_dimensions().to_vec(),
        source.view(),
        Derivation::Subsampled,
        vec![source.clone()],
    )?;
    Ok(Arc::new(coverage))
}

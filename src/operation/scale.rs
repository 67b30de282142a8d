use std::sync::Arc;

use tracing::debug;

use super::{names, Context, Operation};
use crate::config::acceleration;
use crate::coverage::{Coverage, Derivation};
use crate::engine::{Primitive, ScaleParams};
use crate::error::{CoverageError, Result};
use crate::grid::GridGeometry;
use crate::interpolation::{BorderExtender, Interpolation};
use crate::parameters::{
    DefaultValue, OperationDescriptor, ParameterDescriptor, ParameterGroup, ParameterKind, SOURCE_PARAMETER,
};
use crate::transform::MathTransform;

pub static SCALE: OperationDescriptor = OperationDescriptor {
    name: "Scale",
    parameters: &[
        SOURCE_PARAMETER,
        ParameterDescriptor::optional(names::X_SCALE, ParameterKind::Float, DefaultValue::Float(1.)),
        ParameterDescriptor::optional(names::Y_SCALE, ParameterKind::Float, DefaultValue::Float(1.)),
        ParameterDescriptor::optional(names::X_TRANS, ParameterKind::Float, DefaultValue::Float(0.)),
        ParameterDescriptor::optional(names::Y_TRANS, ParameterKind::Float, DefaultValue::Float(0.)),
        ParameterDescriptor::optional(names::INTERPOLATION, ParameterKind::Interpolation, DefaultValue::None),
        ParameterDescriptor::optional(names::BORDER_EXTENDER, ParameterKind::BorderExtender, DefaultValue::None),
    ],
};

/// Scale and translate a coverage in pixel space.
#[derive(Debug, Default, Clone, Copy)]
pub struct Scale;

impl Operation for Scale {
    fn descriptor(&self) -> &'static OperationDescriptor {
        &SCALE
    }

    fn execute(&self, params: &ParameterGroup, ctx: &Context) -> Result<Option<Arc<Coverage>>> {
        params.validate()?;
        let source = params.source()?;
        let factors = ScaleParams {
            x_scale: params.float(names::X_SCALE)?.unwrap_or(1.),
            y_scale: params.float(names::Y_SCALE)?.unwrap_or(1.),
            x_trans: params.float(names::X_TRANS)?.unwrap_or(0.),
            y_trans: params.float(names::Y_TRANS)?.unwrap_or(0.),
        };
        let interpolation = params
            .interpolation(names::INTERPOLATION)?
            .unwrap_or(ctx.config.interpolation);
        let border = params
            .border_extender(names::BORDER_EXTENDER)?
            .unwrap_or(ctx.config.border_extender);
        scale(&source, &factors, interpolation, border, ctx).map(Some)
    }
}

fn check(params: &ScaleParams) -> Result<()> {
    for (name, val) in [(names::X_SCALE, params.x_scale), (names::Y_SCALE, params.y_scale)] {
        if !val.is_finite() || val <= 0. {
            return Err(CoverageError::invalid_value(name, format!("{} is not a positive number", val)));
        }
    }
    for (name, val) in [(names::X_TRANS, params.x_trans), (names::Y_TRANS, params.y_trans)] {
        if !val.is_finite() {
            return Err(CoverageError::invalid_value(name, format!("{} is not finite", val)));
        }
    }
    Ok(())
}

/// Scale `source` by `params`. The grid geometry of the result
/// keeps every pixel at the same place in the CRS, so the
/// envelope scales with the image.
pub fn scale(
    source: &Arc<Coverage>,
    params: &ScaleParams,
    interpolation: Interpolation,
    border: BorderExtender,
    ctx: &Context,
) -> Result<Arc<Coverage>> {
    check(params)?;

    let raster = source.raster();
    debug!(coverage = source.name(), ?params, %interpolation, "scale");
    let image = {
        let _guard = acceleration().guard_for(Primitive::Scale, raster.sample_type(), interpolation);
        ctx.engine.scale(raster, params, interpolation, border)
    }
    .map_err(CoverageError::scale)?;

    let range = source.grid_range().with_window(image.window());
    let dim = range.dimension();
    let grid_to_crs = MathTransform::embed_pixel_transform(&params.to_pixel_transform(), dim)
        .inverse()
        .and_then(|inverse| inverse.then(source.grid_to_crs()))
        .map_err(CoverageError::scale)?;

    let coverage = Coverage::derived(
        source.name(),
        image,
        GridGeometry::new(range, grid_to_crs, source.crs().cloned()),
        source.sample_dimensions().to_vec(),
        source.view(),
        Derivation::Scaled,
        vec![source.clone()],
    )?;
    Ok(Arc::new(coverage))
}

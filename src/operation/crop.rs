use std::sync::Arc;

use geo::Rect;
use tracing::debug;

use super::{names, Context, Operation};
use crate::coverage::{Coverage, Derivation};
use crate::crs::same_crs;
use crate::error::{CoverageError, Result};
use crate::geometry::{BoundsExt, Envelope, PixelWindow};
use crate::grid::GridGeometry;
use crate::parameters::{OperationDescriptor, ParameterDescriptor, ParameterGroup, ParameterKind, SOURCE_PARAMETER};
use crate::transform::MathTransform;

pub static CROP: OperationDescriptor = OperationDescriptor {
    name: "Crop",
    parameters: &[
        SOURCE_PARAMETER,
        ParameterDescriptor::required(names::ENVELOPE, ParameterKind::Envelope),
    ],
};

/// Restrict a coverage to an envelope, without resampling.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crop;

impl Operation for Crop {
    fn descriptor(&self) -> &'static OperationDescriptor {
        &CROP
    }

    fn execute(&self, params: &ParameterGroup, ctx: &Context) -> Result<Option<Arc<Coverage>>> {
        params.validate()?;
        let source = params.source()?;
        let envelope = params
            .envelope(names::ENVELOPE)?
            .ok_or_else(|| CoverageError::MissingParameter(names::ENVELOPE.to_string()))?;
        crop(&source, &envelope, ctx)
    }
}

/// Crop `source` to `envelope`. An envelope without a CRS is
/// taken to be in the CRS of the source. Returns `None` when
/// the envelope misses the coverage, and `source` itself when
/// the envelope covers all of it.
pub fn crop(source: &Arc<Coverage>, envelope: &Envelope, ctx: &Context) -> Result<Option<Arc<Coverage>>> {
    if envelope.crs().is_some() && !same_crs(envelope.crs(), source.crs()) {
        return Err(CoverageError::CrsMismatch {
            expected: crs_name(source.crs()),
            found: crs_name(envelope.crs()),
        });
    }
    let request = match_dimension(envelope, source.envelope())?;

    let area = source.envelope().intersection(&request);
    if area.is_empty() {
        debug!(coverage = source.name(), "crop: empty intersection");
        return Ok(None);
    }

    // Pixel-centre coordinates of the area; edges sit half a
    // pixel further out.
    let pixels = source
        .grid_to_crs()
        .inverse()
        .and_then(|inverse| inverse.transform_envelope(&area))
        .map_err(CoverageError::crop)?;
    let bounds = Rect::new(
        (pixels.lower()[0] + 0.5, pixels.lower()[1] + 0.5),
        (pixels.upper()[0] + 0.5, pixels.upper()[1] + 0.5),
    );
    let window = at_least_one_pixel(bounds.inner_window(), &bounds);

    let full = source.grid_range().window();
    let window = match full.intersection(&window) {
        Some(window) => window,
        None => {
            debug!(coverage = source.name(), "crop: no pixel in intersection");
            return Ok(None);
        }
    };
    if window == full {
        debug!(coverage = source.name(), "crop: envelope covers the coverage");
        return Ok(Some(source.clone()));
    }

    debug!(coverage = source.name(), ?window, "crop");
    let engine = &ctx.engine;
    let image = engine
        .crop(source.raster(), window)
        .and_then(|image| engine.translate(&image, -window.x, -window.y))
        .map_err(CoverageError::crop)?;

    let dim = source.grid_range().dimension();
    let mut offsets = vec![0.; dim];
    offsets[0] = window.x as f64;
    offsets[1] = window.y as f64;
    let grid_to_crs = MathTransform::translation(&offsets)
        .then(source.grid_to_crs())
        .map_err(CoverageError::crop)?;
    let range = source
        .grid_range()
        .with_window(PixelWindow::new(0, 0, window.width, window.height));

    let coverage = Coverage::derived(
        source.name(),
        image,
        GridGeometry::new(range, grid_to_crs, source.crs().cloned()),
        source.sample_dimensions().to_vec(),
        source.view(),
        Derivation::Cropped,
        vec![source.clone()],
    )?;
    Ok(Some(Arc::new(coverage)))
}

fn crs_name(crs: Option<&crate::crs::Crs>) -> String {
    crs.map_or_else(|| "an unknown CRS".to_string(), |crs| crs.to_string())
}

/// Extend a 2D request to the extra axes of `source`.
fn match_dimension(request: &Envelope, source: &Envelope) -> Result<Envelope> {
    if request.dimension() == source.dimension() {
        return Ok(request.clone());
    }
    if request.dimension() != 2 {
        return Err(CoverageError::invalid_value(
            names::ENVELOPE,
            format!(
                "{}D envelope for a {}D coverage",
                request.dimension(),
                source.dimension()
            ),
        ));
    }
    let mut lower = request.lower().to_vec();
    let mut upper = request.upper().to_vec();
    lower.extend_from_slice(&source.lower()[2..]);
    upper.extend_from_slice(&source.upper()[2..]);
    Ok(Envelope::new(lower, upper).with_crs(request.crs().cloned()))
}

/// Widen axes that hold no whole pixel to the pixel holding
/// the middle of `bounds`.
fn at_least_one_pixel(mut window: PixelWindow, bounds: &Rect<f64>) -> PixelWindow {
    let center = bounds.center();
    if window.width == 0 {
        window.x = center.x.floor() as i64;
        window.width = 1;
    }
    if window.height == 0 {
        window.y = center.y.floor() as i64;
        window.height = 1;
    }
    window
}

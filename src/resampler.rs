//! Transform composition for [`Resample`][crate::operation::Resample].
//!
//! Given a source coverage and a (possibly partial) target
//! grid geometry, build the chain
//!
//! ```text
//! target grid -> target CRS -> source CRS -> source grid
//! ```
//!
//! and execute it with the cheapest primitive that is still
//! exact: a crop when the chain is the identity, a metadata
//! rewrite when it is affine and the caller left the grid
//! range open, an affine resampling when it is affine, and a
//! warp otherwise.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::band::View;
use crate::config::acceleration;
use crate::coverage::{Coverage, Derivation};
use crate::crs::{same_crs, Crs};
use crate::engine::Primitive;
use crate::error::{CoverageError, Result, TransformError};
use crate::geometry::GridRange;
use crate::grid::GridGeometry;
use crate::interpolation::Interpolation;
use crate::operation::{names, Context};
use crate::raster::Raster;
use crate::transform::MathTransform;

/// How a resampling was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Nothing to do; the source is returned.
    Unchanged,
    /// The chain is the identity: crop the source.
    Crop,
    /// Same pixels, new declared geometry.
    Metadata,
    Affine,
    Warp,
}

/// Resample `source` into `target_crs` and `target`.
///
/// A missing target CRS defaults to the CRS of `target`, then
/// to the CRS of the source. Parts of `target` left undefined
/// are inferred: the grid range from the envelope of the
/// source, the transform by fitting that envelope to the grid
/// range.
pub fn resample(
    source: &Arc<Coverage>,
    target_crs: Option<&Crs>,
    target: Option<&GridGeometry>,
    interpolation: Interpolation,
    ctx: &Context,
) -> Result<Arc<Coverage>> {
    let requested = target.cloned().unwrap_or_default();
    let target_crs = resolve_crs(target_crs, &requested, source)?;

    // Walk up chains of resampling, stopping at the first
    // coverage that already has the requested geometry. Past a
    // link that resampled pixels only a fully specified request
    // can match, since the inferred parts differ.
    let exact = requested.is_complete();
    let mut current = source.clone();
    let mut shared = true;
    loop {
        if (exact || shared)
            && requested.equivalent(current.grid_geometry())
            && same_crs(target_crs.as_ref(), current.crs())
        {
            debug!(coverage = current.name(), strategy = ?Strategy::Unchanged, "resample");
            return Ok(current);
        }
        let parent = match (current.derivation(), current.sources()) {
            (Derivation::Resampled, [parent]) => parent.clone(),
            _ => break,
        };
        shared &= Arc::ptr_eq(current.raster(), parent.raster());
        current = parent;
    }

    let plan = plan(source, target_crs, &requested, ctx).map_err(CoverageError::reproject)?;
    execute(source, plan, interpolation, ctx)
}

fn resolve_crs(explicit: Option<&Crs>, requested: &GridGeometry, source: &Coverage) -> Result<Option<Crs>> {
    match (explicit, requested.crs()) {
        (Some(a), Some(b)) if !a.equals_ignore_metadata(b) => Err(CoverageError::invalid_value(
            names::GRID_GEOMETRY,
            format!("grid geometry is in {}, but the target CRS is {}", b, a),
        )),
        (Some(crs), _) | (None, Some(crs)) => Ok(Some(crs.clone())),
        (None, None) => Ok(source.crs().cloned()),
    }
}

/// Fully resolved target geometry, and the chain from target
/// pixels to source pixels.
struct Plan {
    range: GridRange,
    grid_to_crs: MathTransform,
    crs: Option<Crs>,
    /// Target grid to source grid, on the two image axes.
    all_steps: MathTransform,
    /// Source grid to target CRS.
    source_to_target: MathTransform,
    explicit_range: bool,
}

fn plan(
    source: &Coverage,
    target_crs: Option<Crs>,
    requested: &GridGeometry,
    ctx: &Context,
) -> std::result::Result<Plan, TransformError> {
    let source_g2c = source.grid_to_crs();
    let source_range = source.grid_range();

    // Target CRS to source CRS, and back.
    let (hop, hop_inverse) = match (source.crs(), target_crs.as_ref()) {
        (None, None) => {
            let dim = source_g2c.target_dimension();
            (MathTransform::identity(dim), MathTransform::identity(dim))
        }
        (Some(s), Some(t)) if s.equals_ignore_metadata(t) => {
            let dim = source_g2c.target_dimension();
            (MathTransform::identity(dim), MathTransform::identity(dim))
        }
        (Some(s), Some(t)) => {
            let hop = ctx.factory.create_operation(t, s)?;
            let inverse = match hop.inverse() {
                Ok(inverse) => inverse,
                Err(_) => ctx.factory.create_operation(s, t)?,
            };
            (hop, inverse)
        }
        _ => return Err(TransformError::UnknownCrs),
    };
    let source_to_target = source_g2c.then(&hop_inverse)?;
    let envelope = hop_inverse
        .transform_envelope(source.envelope())?
        .with_crs(target_crs.clone());

    let reversed = GridGeometry::reversed_axes(source_g2c);
    let (range, grid_to_crs) = match (requested.range(), requested.grid_to_crs()) {
        (Some(range), Some(t)) => (range.clone(), t.clone()),
        (None, Some(t)) => (GridGeometry::infer_range(&envelope, t)?, t.clone()),
        (Some(range), None) => (
            range.clone(),
            GridGeometry::fit_transform(range, &envelope, &reversed),
        ),
        (None, None) if source_to_target.is_affine() => (source_range.clone(), source_to_target.clone()),
        (None, None) => (
            source_range.clone(),
            GridGeometry::fit_transform(source_range, &envelope, &reversed),
        ),
    };

    let all_steps = grid_to_crs
        .then(&hop)?
        .then(&source_g2c.inverse()?)?
        .sub_transform_2d(0, 1)?;

    Ok(Plan {
        range,
        grid_to_crs,
        crs: target_crs,
        all_steps,
        source_to_target,
        explicit_range: requested.range().is_some(),
    })
}

fn execute(original: &Arc<Coverage>, plan: Plan, interpolation: Interpolation, ctx: &Context) -> Result<Arc<Coverage>> {
    let eps = ctx.config.identity_tolerance;
    let target_window = plan.range.window();
    let source_window = original.grid_range().window();

    if plan.all_steps.is_identity(eps) && source_window.contains(&target_window) {
        debug!(coverage = original.name(), strategy = ?Strategy::Crop, "resample");
        let image = if target_window == source_window {
            original.raster().clone()
        } else {
            ctx.engine
                .crop(original.raster(), target_window)
                .map_err(CoverageError::reproject)?
        };
        return finish(original, image, plan, original.view(), false);
    }

    if plan.all_steps.is_affine() && !plan.explicit_range {
        debug!(coverage = original.name(), strategy = ?Strategy::Metadata, "resample");
        let plan = Plan {
            range: original.grid_range().clone(),
            grid_to_crs: plan.source_to_target.clone(),
            ..plan
        };
        return finish(original, original.raster().clone(), plan, original.view(), false);
    }

    // Nearest-neighbour is exact on packed values, as long as
    // packing loses nothing.
    let packed = if interpolation == Interpolation::Nearest && original.view() == View::Geophysics {
        original.lossless_packed()?
    } else {
        None
    };
    let use_packed = packed.is_some();
    let working = packed.unwrap_or_else(|| original.clone());
    let raster = working.raster();
    let background = working.background();

    let image = match plan.all_steps.as_pixel_transform() {
        Some(all_steps) => {
            debug!(coverage = original.name(), strategy = ?Strategy::Affine, %interpolation, "resample");
            let forward = all_steps.try_inverse().ok_or_else(|| CoverageError::reproject(TransformError::NonInvertible))?;
            let _guard = acceleration().guard_for(Primitive::Affine, raster.sample_type(), interpolation);
            ctx.engine
                .affine(raster, &forward, interpolation, &background, Some(target_window))
        }
        None => {
            debug!(coverage = original.name(), strategy = ?Strategy::Warp, %interpolation, "resample");
            ctx.engine
                .warp(raster, &plan.all_steps, interpolation, &background, target_window)
        }
    }
    .map_err(CoverageError::reproject)?;

    finish(original, image, plan, working.view(), use_packed)
}

/// Wrap `image` in the resampled coverage, reconciling the
/// declared grid range with the actual image bounds.
fn finish(
    original: &Arc<Coverage>,
    image: Arc<Raster>,
    plan: Plan,
    view: View,
    unpack: bool,
) -> Result<Arc<Coverage>> {
    let mut range = plan.range;
    let actual = image.window();
    if actual != range.window() {
        if plan.explicit_range {
            warn!(
                coverage = original.name(),
                requested = ?range.window(),
                ?actual,
                "raster engine did not honour the requested grid range"
            );
        } else {
            debug!(
                coverage = original.name(),
                computed = ?range.window(),
                ?actual,
                "grid range adjusted to the image bounds"
            );
        }
        range = range.with_window(actual);
    }

    let bands = original.sample_dimensions();
    let (image, view) = if unpack {
        let sample_type = original.raster().sample_type();
        let raster = image.map_bands(sample_type, |band, val| bands[band].to_geophysics(val));
        (Arc::new(raster), View::Geophysics)
    } else {
        (image, view)
    };

    let coverage = Coverage::derived(
        original.name(),
        image,
        GridGeometry::new(range, plan.grid_to_crs, plan.crs),
        bands.to_vec(),
        view,
        Derivation::Resampled,
        vec![original.clone()],
    )?;
    Ok(Arc::new(coverage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{NumberRange, SampleDimension, Transfer};
    use crate::geometry::{Envelope, PixelWindow};
    use crate::raster::SampleType;
    use crate::testing::{coverage_100, crs_a, crs_b, engine_context, recording_context};
    use ndarray::Array2;

    #[test]
    fn test_same_crs_without_geometry_is_noop() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let out = resample(&source, Some(&crs_a()), None, Interpolation::Nearest, &ctx).unwrap();
        assert!(Arc::ptr_eq(&out, &source));

        let out = resample(&source, None, Some(source.grid_geometry()), Interpolation::Bilinear, &ctx).unwrap();
        assert!(Arc::ptr_eq(&out, &source));
        assert_eq!(calls.count(), 0);
    }

    #[test]
    fn test_affine_crs_change_rewrites_metadata() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let out = resample(&source, Some(&crs_b()), None, Interpolation::Bilinear, &ctx).unwrap();

        assert_eq!(calls.count(), 0);
        assert!(Arc::ptr_eq(out.raster(), source.raster()));
        assert!(out.crs().unwrap().equals_ignore_metadata(&crs_b()));
        assert!(out
            .envelope()
            .approx_eq(&Envelope::new(vec![10., 10.], vec![210., 210.]), 1e-9));
        assert_eq!(out.derivation(), Derivation::Resampled);
    }

    #[test]
    fn test_chain_collapses_to_original() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let in_b = resample(&source, Some(&crs_b()), None, Interpolation::Nearest, &ctx).unwrap();
        let back = resample(&in_b, Some(&crs_a()), None, Interpolation::Nearest, &ctx).unwrap();
        assert!(Arc::ptr_eq(&back, &source));
        assert_eq!(calls.count(), 0);
    }

    #[test]
    fn test_resampling_a_crop_keeps_its_extent() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let target = GridGeometry::new(
            GridRange::new(vec![10, 20], vec![30, 50]),
            source.grid_to_crs().clone(),
            None,
        );
        let sub = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();
        let in_b = resample(&sub, Some(&crs_b()), None, Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(calls.primitives(), vec![Primitive::Crop]);
        assert!(Arc::ptr_eq(in_b.raster(), sub.raster()));
        assert_eq!(in_b.grid_range().window(), PixelWindow::new(10, 20, 20, 30));
        assert!(in_b
            .envelope()
            .approx_eq(&Envelope::new(vec![30., 50.], vec![70., 110.]), 1e-9));
        assert!(Arc::ptr_eq(&in_b.sources()[0], &sub));

        // back in A, the crop itself is the match
        let back = resample(&in_b, Some(&crs_a()), None, Interpolation::Nearest, &ctx).unwrap();
        assert!(Arc::ptr_eq(&back, &sub));
    }

    #[test]
    fn test_explicit_range_inside_source_crops() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let target = GridGeometry::new(
            GridRange::new(vec![10, 20], vec![30, 50]),
            source.grid_to_crs().clone(),
            None,
        );
        let out = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(calls.primitives(), vec![Primitive::Crop]);
        assert_eq!(out.grid_range().window(), PixelWindow::new(10, 20, 20, 30));
        assert_eq!(out.raster().get(0, 10, 20), source.raster().get(0, 10, 20));
        assert!(out
            .envelope()
            .approx_eq(&Envelope::new(vec![10., 20.], vec![30., 50.]), 1e-9));
    }

    #[test]
    fn test_explicit_range_outside_source_fills_background() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let target = GridGeometry::new(
            GridRange::new(vec![-10, -10], vec![110, 110]),
            source.grid_to_crs().clone(),
            None,
        );
        let out = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(calls.primitives(), vec![Primitive::Affine]);
        assert_eq!(out.grid_range().window(), PixelWindow::new(-10, -10, 120, 120));
        assert!(out.raster().get(0, -5, 50).unwrap().is_nan());
        assert_eq!(out.raster().get(0, 50, 50), source.raster().get(0, 50, 50));
    }

    #[test]
    fn test_interpolated_affine_runs_without_acceleration() {
        let (ctx, calls) = recording_context();
        let source = coverage_100();
        let target = GridGeometry::new(
            GridRange::new(vec![-10, -10], vec![110, 110]),
            source.grid_to_crs().clone(),
            None,
        );
        resample(&source, None, Some(&target), Interpolation::Bilinear, &ctx).unwrap();
        assert_eq!(calls.primitives(), vec![Primitive::Affine]);
        assert_eq!(calls.native(), vec![false]);
        {
            let _fixed = acceleration().lock();
            assert!(acceleration().is_native_enabled(Primitive::Affine));
        }

        let (ctx, calls) = recording_context();
        {
            let _fixed = acceleration().lock();
            resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();
        }
        assert_eq!(calls.native(), vec![true]);
    }

    #[test]
    fn test_bounds_reconciliation() {
        let (ctx, _) = engine_context(true);
        let source = coverage_100();
        // pixels of 2.5 units, over twice the source envelope
        let target = GridGeometry::from_envelope(
            GridRange::new(vec![0, 0], vec![80, 80]),
            &Envelope::new(vec![0., 0.], vec![200., 200.]),
        );
        let out = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();
        // the engine sized the output to the source footprint
        assert_eq!(out.grid_range().window(), PixelWindow::new(0, 0, 40, 40));
        assert_eq!(out.raster().window(), out.grid_range().window());
        assert!(out
            .envelope()
            .approx_eq(&Envelope::new(vec![0., 0.], vec![100., 100.]), 1e-9));
    }

    #[test]
    fn test_non_affine_hop_warps() {
        let (ctx, calls) = recording_context();
        let crs_c = Crs::new("LOCAL:C", 2);
        let registry = crate::crs::OperationRegistry::new();
        // C = (A.x + 0.001 * A.y², A.y)
        registry
            .register(
                &crs_a(),
                &crs_c,
                MathTransform::general(
                    2,
                    2,
                    |p| vec![p[0] + 0.001 * p[1] * p[1], p[1]],
                    Some(Arc::new(|p: &[f64]| vec![p[0] - 0.001 * p[1] * p[1], p[1]])),
                ),
            )
            .unwrap();
        let ctx = Context {
            factory: Arc::new(registry),
            ..ctx
        };
        let source = coverage_100();
        let out = resample(&source, Some(&crs_c), None, Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(calls.primitives(), vec![Primitive::Warp]);
        assert!(out.crs().unwrap().equals_ignore_metadata(&crs_c));
        assert_eq!(out.grid_range().window(), source.grid_range().window());
        assert!(out.envelope().approx_eq(
            &Envelope::new(vec![0., 0.], vec![110., 100.]),
            1e-6
        ));
    }

    #[test]
    fn test_unknown_crs() {
        let (ctx, _) = recording_context();
        let band = Array2::zeros((4, 4));
        let gg = GridGeometry::from_envelope(GridRange::with_dims(4, 4), &Envelope::new(vec![0., 0.], vec![4., 4.]));
        let source = Arc::new(
            Coverage::new(
                "no crs",
                Raster::from_band(band, SampleType::Float32),
                gg,
                vec![SampleDimension::new("b")],
            )
            .unwrap(),
        );
        let err = resample(&source, Some(&crs_a()), None, Interpolation::Nearest, &ctx).unwrap_err();
        assert!(matches!(
            err,
            CoverageError::CannotReproject(crate::error::FailureCause::Transform(TransformError::UnknownCrs))
        ));

        let err = resample(&coverage_100(), Some(&Crs::new("LOCAL:Z", 2)), None, Interpolation::Nearest, &ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            CoverageError::CannotReproject(crate::error::FailureCause::Transform(TransformError::NoOperation { .. }))
        ));
    }

    #[test]
    fn test_nearest_resamples_packed_values() {
        let (ctx, _) = recording_context();
        let band = SampleDimension::new("temperature")
            .with_no_data(NumberRange::singleton(-99.))
            .with_transfer(
                Transfer::new(0.1, 0., SampleType::UInt8).with_packed_no_data(NumberRange::singleton(255.)),
            );
        let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64 / 10.);
        let gg = GridGeometry::from_envelope(GridRange::with_dims(4, 4), &Envelope::new(vec![0., 0.], vec![4., 4.]))
            .with_crs(Some(crs_a()));
        let source = Arc::new(
            Coverage::new("t", Raster::from_band(data, SampleType::Float32), gg, vec![band]).unwrap(),
        );
        let target = GridGeometry::new(
            GridRange::new(vec![0, 0], vec![6, 4]),
            source.grid_to_crs().clone(),
            None,
        );
        let out = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(out.view(), View::Geophysics);
        assert_eq!(out.raster().sample_type(), SampleType::Float32);
        let v = out.raster().get(0, 3, 2).unwrap();
        assert!((v - 1.1).abs() < 1e-6);
        // outside pixels carry the geophysics no-data value
        assert_eq!(out.raster().get(0, 5, 0), Some(-99.));
        assert!(Arc::ptr_eq(&out.sources()[0], &source));
    }

    #[test]
    fn test_nearest_keeps_values_packing_would_round() {
        let (ctx, _) = recording_context();
        let bands = vec![
            SampleDimension::new("tenths").with_transfer(Transfer::new(0.1, 0., SampleType::UInt8)),
            SampleDimension::new("plain"),
        ];
        let mut data = ndarray::Array3::zeros((2, 4, 4));
        data[[0, 1, 2]] = 0.123;
        data[[1, 1, 2]] = 1005.5;
        let gg = GridGeometry::from_envelope(GridRange::with_dims(4, 4), &Envelope::new(vec![0., 0.], vec![4., 4.]))
            .with_crs(Some(crs_a()));
        let source = Arc::new(Coverage::new("mixed", Raster::new(data, SampleType::Float32), gg, bands).unwrap());
        let target = GridGeometry::new(
            GridRange::new(vec![0, 0], vec![6, 4]),
            source.grid_to_crs().clone(),
            None,
        );
        let out = resample(&source, None, Some(&target), Interpolation::Nearest, &ctx).unwrap();

        assert_eq!(out.view(), View::Geophysics);
        assert!((out.raster().get(0, 2, 1).unwrap() - 0.123).abs() < 1e-6);
        assert_eq!(out.raster().get(1, 2, 1), Some(1005.5));
    }
}

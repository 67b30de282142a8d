//! Fixtures shared by unit tests.

use std::sync::{Arc, Mutex};

use ndarray::Array2;

use crate::band::SampleDimension;
use crate::config::acceleration;
use crate::coverage::Coverage;
use crate::crs::{Crs, OperationRegistry};
use crate::engine::{MemoryEngine, Primitive, RasterEngine, ScaleParams, SubsampleParams};
use crate::error::EngineError;
use crate::geometry::{GridRange, PixelInCell, PixelTransform, PixelWindow};
use crate::grid::GridGeometry;
use crate::interpolation::{BorderExtender, Interpolation};
use crate::operation::Context;
use crate::raster::{Raster, SampleType};
use crate::transform::MathTransform;

pub(crate) fn crs_a() -> Crs {
    Crs::new("LOCAL:A", 2)
}

pub(crate) fn crs_b() -> Crs {
    Crs::new("LOCAL:B", 2)
}

/// `B = 2 * A + 10` on both axes.
pub(crate) fn a_to_b() -> MathTransform {
    MathTransform::scale_translate(&[2., 2.], &[10., 10.])
}

/// 100x100 ramp (`value = 100 * row + col`), pixel edges on
/// integer coordinates of `[0, 100]²` in `LOCAL:A`.
pub(crate) fn coverage_100() -> Arc<Coverage> {
    let band = Array2::from_shape_fn((100, 100), |(r, c)| (100 * r + c) as f64);
    let gg = GridGeometry::with_anchor(
        GridRange::with_dims(100, 100),
        MathTransform::identity(2),
        PixelInCell::Corner,
        Some(crs_a()),
    )
    .unwrap();
    Arc::new(
        Coverage::new(
            "ramp",
            Raster::from_band(band, SampleType::Float64),
            gg,
            vec![SampleDimension::new("values")],
        )
        .unwrap(),
    )
}

/// Primitives invoked on a [`RecordingEngine`], with the
/// acceleration switch of each at the time of the call.
#[derive(Clone, Default)]
pub(crate) struct Calls(Arc<Mutex<Vec<(Primitive, bool)>>>);

impl Calls {
    fn push(&self, primitive: Primitive) {
        let native = acceleration().is_native_enabled(primitive);
        self.0.lock().unwrap().push((primitive, native));
    }

    pub(crate) fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub(crate) fn primitives(&self) -> Vec<Primitive> {
        self.0.lock().unwrap().iter().map(|&(p, _)| p).collect()
    }

    pub(crate) fn native(&self) -> Vec<bool> {
        self.0.lock().unwrap().iter().map(|&(_, native)| native).collect()
    }
}

/// [`MemoryEngine`] that records its calls. With
/// `ignore_layout`, affine layout hints are dropped.
pub(crate) struct RecordingEngine {
    pub(crate) calls: Calls,
    pub(crate) ignore_layout: bool,
}

impl RasterEngine for RecordingEngine {
    fn crop(&self, image: &Arc<Raster>, window: PixelWindow) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::Crop);
        MemoryEngine.crop(image, window)
    }

    fn translate(&self, image: &Arc<Raster>, dx: i64, dy: i64) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::Translate);
        MemoryEngine.translate(image, dx, dy)
    }

    fn affine(
        &self,
        image: &Arc<Raster>,
        forward: &PixelTransform,
        interpolation: Interpolation,
        background: &[f64],
        layout: Option<PixelWindow>,
    ) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::Affine);
        let layout = if self.ignore_layout { None } else { layout };
        MemoryEngine.affine(image, forward, interpolation, background, layout)
    }

    fn warp(
        &self,
        image: &Arc<Raster>,
        target_to_source: &MathTransform,
        interpolation: Interpolation,
        background: &[f64],
        window: PixelWindow,
    ) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::Warp);
        MemoryEngine.warp(image, target_to_source, interpolation, background, window)
    }

    fn scale(
        &self,
        image: &Arc<Raster>,
        params: &ScaleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::Scale);
        MemoryEngine.scale(image, params, interpolation, border)
    }

    fn filtered_subsample(
        &self,
        image: &Arc<Raster>,
        params: &SubsampleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        self.calls.push(Primitive::FilteredSubsample);
        MemoryEngine.filtered_subsample(image, params, interpolation, border)
    }
}

fn registry() -> Arc<OperationRegistry> {
    let registry = OperationRegistry::new();
    registry.register(&crs_a(), &crs_b(), a_to_b()).unwrap();
    Arc::new(registry)
}

/// Context over a [`RecordingEngine`], with `A -> B`
/// registered.
pub(crate) fn recording_context() -> (Context, Calls) {
    engine_context(false)
}

pub(crate) fn engine_context(ignore_layout: bool) -> (Context, Calls) {
    let calls = Calls::default();
    let engine = RecordingEngine {
        calls: calls.clone(),
        ignore_layout,
    };
    (Context::new(Arc::new(engine), registry()), calls)
}

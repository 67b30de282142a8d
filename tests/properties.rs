use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use ndarray::Array2;
use rand::{thread_rng, Rng};

use coverages::config::acceleration;
use coverages::prelude::*;

/// Counts engine calls, and scales run with acceleration on;
/// optionally drops affine layout hints the way some engines
/// do.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
    native_scales: AtomicUsize,
    ignore_layout: bool,
}

impl Counting {
    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl RasterEngine for Counting {
    fn crop(&self, image: &Arc<Raster>, window: PixelWindow) -> Result<Arc<Raster>, EngineError> {
        self.hit();
        MemoryEngine.crop(image, window)
    }

    fn translate(&self, image: &Arc<Raster>, dx: i64, dy: i64) -> Result<Arc<Raster>, EngineError> {
        self.hit();
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
        self.hit();
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
        self.hit();
        MemoryEngine.warp(image, target_to_source, interpolation, background, window)
    }

    fn scale(
        &self,
        image: &Arc<Raster>,
        params: &ScaleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        self.hit();
        if acceleration().is_native_enabled(Primitive::Scale) {
            self.native_scales.fetch_add(1, Ordering::SeqCst);
        }
        MemoryEngine.scale(image, params, interpolation, border)
    }

    fn filtered_subsample(
        &self,
        image: &Arc<Raster>,
        params: &SubsampleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        self.hit();
        MemoryEngine.filtered_subsample(image, params, interpolation, border)
    }
}

fn crs_a() -> Crs {
    Crs::new("LOCAL:A", 2)
}

fn crs_b() -> Crs {
    Crs::new("LOCAL:B", 2)
}

fn processor(ignore_layout: bool) -> Result<(Processor, Arc<Counting>)> {
    let engine = Arc::new(Counting {
        ignore_layout,
        ..Default::default()
    });
    let registry = OperationRegistry::new();
    // B = 2 * A + 10
    registry.register(
        &crs_a(),
        &crs_b(),
        MathTransform::scale_translate(&[2., 2.], &[10., 10.]),
    )?;
    Ok((Processor::new(engine.clone(), Arc::new(registry)), engine))
}

/// 100x100 ramp over `[0, 100]²` in `LOCAL:A`, whose band
/// background is -5.
fn source() -> Result<Arc<Coverage>> {
    let band = Array2::from_shape_fn((100, 100), |(r, c)| (100 * r + c) as f64);
    let gg = GridGeometry::with_anchor(
        GridRange::with_dims(100, 100),
        MathTransform::identity(2),
        PixelInCell::Corner,
        Some(crs_a()),
    )?;
    let dim = SampleDimension::new("ramp").with_no_data(NumberRange::new(-10., -5., false, true));
    Ok(Arc::new(Coverage::new(
        "ramp",
        Raster::from_band(band, SampleType::Float64),
        gg,
        vec![dim],
    )?))
}

fn env(x0: f64, y0: f64, x1: f64, y1: f64) -> Envelope {
    Envelope::new(vec![x0, y0], vec![x1, y1])
}

#[test]
fn resample_to_own_geometry_returns_source() -> Result<()> {
    let (p, engine) = processor(false)?;
    let src = source()?;

    let out = p.resample(src.clone(), Some(crs_a()), None, None)?;
    assert!(Arc::ptr_eq(&out, &src));

    let out = p.resample(
        src.clone(),
        Some(crs_a()),
        Some(src.grid_geometry().clone()),
        Some(Interpolation::Bicubic),
    )?;
    assert!(Arc::ptr_eq(&out, &src));
    assert_eq!(engine.count(), 0);
    Ok(())
}

#[test]
fn crop_scenario() -> Result<()> {
    let (p, _) = processor(false)?;
    let out = p
        .crop(source()?, env(20., 20., 60., 60.))?
        .expect("envelopes intersect");
    assert_eq!(out.grid_range().window(), PixelWindow::new(0, 0, 40, 40));
    assert_eq!(out.raster().width(), 40);
    assert_eq!(out.raster().height(), 40);
    assert!(out.envelope().approx_eq(&env(20., 20., 60., 60.), 1e-9));
    Ok(())
}

#[test]
fn crop_is_subset_and_absent_iff_disjoint() -> Result<()> {
    let (p, _) = processor(false)?;
    let src = source()?;

    let same = p.crop(src.clone(), src.envelope().clone())?.expect("full crop");
    assert!(Arc::ptr_eq(&same, &src));

    let mut rng = thread_rng();
    for _ in 0..200 {
        let x0 = rng.gen_range(-60., 140.);
        let y0 = rng.gen_range(-60., 140.);
        let request = env(x0, y0, x0 + rng.gen_range(0.05, 80.), y0 + rng.gen_range(0.05, 80.));
        let area = request.intersection(src.envelope());

        match p.crop(src.clone(), request.clone())? {
            None => assert!(area.is_empty(), "{:?} intersects", request),
            Some(out) => {
                assert!(!area.is_empty(), "{:?} is disjoint", request);
                assert!(src.envelope().contains(out.envelope(), 1e-9));
                for axis in 0..2 {
                    let (lo, hi) = (area.lower()[axis], area.upper()[axis]);
                    let (out_lo, out_hi) = (out.envelope().lower()[axis], out.envelope().upper()[axis]);
                    if (hi + 1e-6).floor() <= (lo - 1e-6).ceil() {
                        // no whole pixel: the one holding the middle
                        let mid = (lo + hi) / 2.;
                        assert_eq!(out_hi - out_lo, 1., "{:?} along {}", request, axis);
                        assert!(out_lo <= mid && mid <= out_hi, "{:?} along {}", request, axis);
                    } else {
                        assert!(lo - 1e-6 <= out_lo && out_hi <= hi + 1e-6, "{:?} not in {:?}", out.envelope(), area);
                    }
                }
            }
        }
    }
    Ok(())
}

#[test]
fn affine_crs_change_only_rewrites_geometry() -> Result<()> {
    let (p, engine) = processor(false)?;
    let src = source()?;
    let out = p.resample(src.clone(), Some(crs_b()), None, Some(Interpolation::Bilinear))?;

    assert_eq!(engine.count(), 0);
    assert!(Arc::ptr_eq(out.raster(), src.raster()));
    assert_eq!(out.grid_range(), src.grid_range());
    assert!(out.envelope().approx_eq(&env(10., 10., 210., 210.), 1e-9));
    assert!(out.crs().map_or(false, |crs| crs.equals_ignore_metadata(&crs_b())));
    Ok(())
}

#[test]
fn round_trip_restores_envelope() -> Result<()> {
    let (p, engine) = processor(false)?;
    let src = source()?;

    let target = GridGeometry::from_envelope(GridRange::with_dims(50, 50), &env(10., 10., 210., 210.))
        .with_crs(Some(crs_b()));
    let in_b = p.resample(src.clone(), None, Some(target), None)?;
    assert_eq!(engine.count(), 1);
    assert!(in_b.envelope().approx_eq(&env(10., 10., 210., 210.), 1e-9));

    let back = p.resample(in_b, Some(crs_a()), Some(src.grid_geometry().clone()), None)?;
    let half_pixel = 0.5;
    assert!(back.envelope().approx_eq(src.envelope(), half_pixel));
    assert!(back.crs().map_or(false, |crs| crs.equals_ignore_metadata(&crs_a())));
    Ok(())
}

#[test]
fn larger_target_is_filled_with_background() -> Result<()> {
    let (p, engine) = processor(false)?;
    let src = source()?;

    // 4 units per pixel over [0, 240]² in B; the source covers
    // [10, 210]²
    let target = GridGeometry::from_envelope(GridRange::with_dims(60, 60), &env(0., 0., 240., 240.));
    let out = p.resample(src, Some(crs_b()), Some(target), Some(Interpolation::Nearest))?;
    assert_eq!(engine.count(), 1);
    assert_eq!(out.raster().window(), PixelWindow::new(0, 0, 60, 60));

    let outside = |v: f64| !(8. ..=212.).contains(&v);
    let inside = |v: f64| (12. ..=208.).contains(&v);
    for row in 0..60_i64 {
        for col in 0..60_i64 {
            let (x, y) = (4. * col as f64 + 2., 4. * row as f64 + 2.);
            let val = out.raster().get(0, col, row).expect("pixel in image");
            if outside(x) || outside(y) {
                assert_eq!(val, -5., "pixel ({}, {})", col, row);
            } else if inside(x) && inside(y) {
                assert!(val >= 0., "pixel ({}, {}) is {}", col, row, val);
            }
        }
    }
    Ok(())
}

#[test]
fn declared_range_follows_actual_image() -> Result<()> {
    let (p, _) = processor(true)?;
    let src = source()?;

    // asks for 50x50 pixels of 4 units over [0, 200]²; the
    // engine only renders the source footprint
    let target = GridGeometry::from_envelope(GridRange::with_dims(50, 50), &env(0., 0., 200., 200.));
    let out = p.resample(src, None, Some(target), Some(Interpolation::Nearest))?;

    assert_eq!(out.raster().window(), PixelWindow::new(0, 0, 25, 25));
    assert_eq!(out.grid_range().window(), out.raster().window());
    assert!(out.envelope().approx_eq(&env(0., 0., 100., 100.), 1e-9));
    Ok(())
}

#[test]
fn parameter_errors_precede_computation() -> Result<()> {
    let (p, engine) = processor(false)?;
    let params = p.parameters("crop")?;
    assert_eq!(
        p.execute(&params).unwrap_err(),
        CoverageError::MissingParameter("Source".into())
    );

    let mut params = p.parameters("Scale")?.with_source(source()?)?;
    let err = params.set(names::X_SCALE, crs_a()).unwrap_err();
    assert!(matches!(err, CoverageError::InvalidParameterType { .. }));
    assert_eq!(engine.count(), 0);
    Ok(())
}

#[test]
fn concurrent_interpolated_scales_restore_acceleration() -> Result<()> {
    let (p, engine) = processor(false)?;
    let p = Arc::new(p);
    let src = source()?;
    assert!(acceleration().is_native_enabled(Primitive::Scale));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let p = p.clone();
            let src = src.clone();
            thread::spawn(move || {
                p.scale(src, 0.5, 0.5, 0., 0., Interpolation::Bilinear, BorderExtender::Copy)
                    .map(|out| out.raster().window())
            })
        })
        .collect();
    for handle in handles {
        let window = handle.join().expect("scale thread panicked")?;
        assert_eq!(window, PixelWindow::new(0, 0, 50, 50));
    }
    assert_eq!(engine.count(), 4);
    assert_eq!(engine.native_scales.load(Ordering::SeqCst), 0);
    assert!(acceleration().is_native_enabled(Primitive::Scale));
    Ok(())
}

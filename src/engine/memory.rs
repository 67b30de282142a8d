//! Reference [`RasterEngine`] over in-memory rasters.

use std::sync::Arc;

use ndarray::{s, Array3};
#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use super::{Primitive, RasterEngine, ScaleParams, SubsampleParams};
#[cfg(feature = "use-rayon")]
use crate::config::acceleration;
use crate::error::EngineError;
use crate::geometry::{apply, bounding_box, GridRange, PixelTransform, PixelWindow};
use crate::interpolation::{BorderExtender, Interpolation, Sampler};
use crate::raster::{Raster, SampleType};
use crate::transform::MathTransform;

/// Computes every primitive directly on [`Raster`] buffers.
///
/// With the `use-rayon` feature, pixels are computed in
/// parallel while native acceleration is enabled for the
/// primitive (see [`crate::config::Acceleration`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEngine;

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine
    }
}

/// Fill `window` with `f(band, x, y)`, quantized to
/// `sample_type`.
fn render<F>(
    primitive: Primitive,
    bands: usize,
    window: PixelWindow,
    sample_type: SampleType,
    f: F,
) -> Result<Raster, EngineError>
where
    F: Fn(usize, i64, i64) -> f64 + Sync,
{
    if window.is_empty() {
        return Err(EngineError::EmptyOutput { primitive });
    }
    let (w, h) = (window.width, window.height);
    let plane = w * h;
    let pixel = |idx: usize| {
        let band = idx / plane;
        let row = (idx % plane) / w;
        let col = idx % w;
        sample_type.quantize(f(band, window.x + col as i64, window.y + row as i64))
    };
    let total = bands * plane;

    #[cfg(feature = "use-rayon")]
    let data: Vec<f64> = if acceleration().is_native_enabled(primitive) {
        (0..total).into_par_iter().map(pixel).collect()
    } else {
        (0..total).map(pixel).collect()
    };
    #[cfg(not(feature = "use-rayon"))]
    let data: Vec<f64> = (0..total).map(pixel).collect();

    let data = Array3::from_shape_vec((bands, h, w), data)
        .map_err(|e| EngineError::invalid_argument(primitive, e.to_string()))?;
    Ok(Raster::new(data, sample_type).with_origin(window.x, window.y))
}

fn samplers(image: &Raster, interpolation: Interpolation, border: Option<BorderExtender>) -> Vec<Sampler<'_>> {
    (0..image.num_bands())
        .map(|band| Sampler::new(image.band(band), image.origin(), interpolation, border))
        .collect()
}

fn check_background(primitive: Primitive, image: &Raster, background: &[f64]) -> Result<(), EngineError> {
    if background.len() != image.num_bands() {
        return Err(EngineError::invalid_argument(
            primitive,
            format!(
                "{} background values for {} bands",
                background.len(),
                image.num_bands()
            ),
        ));
    }
    Ok(())
}

/// Window covering the image of `window` under `forward`.
fn footprint(forward: &PixelTransform, window: &PixelWindow) -> PixelWindow {
    let (x0, y0) = (window.x as f64 - 0.5, window.y as f64 - 0.5);
    let (x1, y1) = (window.max_x() as f64 - 0.5, window.max_y() as f64 - 0.5);
    let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)]
        .iter()
        .map(|&(x, y)| {
            let (u, v) = apply(forward, x, y);
            vec![u, v]
        })
        .collect::<Vec<_>>();
    let (lower, upper) = bounding_box(corners, 2);
    GridRange::from_box(&lower, &upper).window()
}

impl RasterEngine for MemoryEngine {
    fn crop(&self, image: &Arc<Raster>, window: PixelWindow) -> Result<Arc<Raster>, EngineError> {
        if window.is_empty() {
            return Err(EngineError::EmptyOutput {
                primitive: Primitive::Crop,
            });
        }
        let bounds = image.window();
        if !bounds.contains(&window) {
            return Err(EngineError::invalid_argument(
                Primitive::Crop,
                format!("{:?} is not within the image bounds {:?}", window, bounds),
            ));
        }
        if window == bounds {
            return Ok(image.clone());
        }

        let c0 = (window.x - bounds.x) as usize;
        let r0 = (window.y - bounds.y) as usize;
        let data = image
            .data()
            .slice(s![.., r0..r0 + window.height, c0..c0 + window.width])
            .to_owned();
        Ok(Arc::new(
            Raster::new(data, image.sample_type()).with_origin(window.x, window.y),
        ))
    }

    fn translate(&self, image: &Arc<Raster>, dx: i64, dy: i64) -> Result<Arc<Raster>, EngineError> {
        if dx == 0 && dy == 0 {
            return Ok(image.clone());
        }
        Ok(Arc::new(image.translated(dx, dy)))
    }

    fn affine(
        &self,
        image: &Arc<Raster>,
        forward: &PixelTransform,
        interpolation: Interpolation,
        background: &[f64],
        layout: Option<PixelWindow>,
    ) -> Result<Arc<Raster>, EngineError> {
        check_background(Primitive::Affine, image, background)?;
        let inverse = forward
            .try_inverse()
            .ok_or_else(|| EngineError::invalid_argument(Primitive::Affine, "singular matrix"))?;
        let window = layout.unwrap_or_else(|| footprint(forward, &image.window()));

        let samplers = samplers(image, interpolation, None);
        let out = render(
            Primitive::Affine,
            image.num_bands(),
            window,
            image.sample_type(),
            |band, x, y| {
                let (sx, sy) = apply(&inverse, x as f64, y as f64);
                samplers[band].sample(sx, sy).unwrap_or(background[band])
            },
        )?;
        Ok(Arc::new(out))
    }

    fn warp(
        &self,
        image: &Arc<Raster>,
        target_to_source: &MathTransform,
        interpolation: Interpolation,
        background: &[f64],
        window: PixelWindow,
    ) -> Result<Arc<Raster>, EngineError> {
        check_background(Primitive::Warp, image, background)?;
        if target_to_source.source_dimension() != 2 || target_to_source.target_dimension() != 2 {
            return Err(EngineError::invalid_argument(
                Primitive::Warp,
                "warp needs a two dimensional transform",
            ));
        }

        let samplers = samplers(image, interpolation, None);
        let out = render(
            Primitive::Warp,
            image.num_bands(),
            window,
            image.sample_type(),
            |band, x, y| {
                let src = match target_to_source.transform_point(&[x as f64, y as f64]) {
                    Ok(src) => src,
                    Err(_) => return background[band],
                };
                samplers[band]
                    .sample(src[0], src[1])
                    .unwrap_or(background[band])
            },
        )?;
        Ok(Arc::new(out))
    }

    fn scale(
        &self,
        image: &Arc<Raster>,
        params: &ScaleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        let centre = params.to_pixel_transform();
        let inverse = centre
            .try_inverse()
            .ok_or_else(|| EngineError::invalid_argument(Primitive::Scale, "zero scale factor"))?;
        let window = params.output_window(&image.window());

        let samplers = samplers(image, interpolation, Some(border));
        let out = render(
            Primitive::Scale,
            image.num_bands(),
            window,
            image.sample_type(),
            |band, x, y| {
                let (sx, sy) = apply(&inverse, x as f64, y as f64);
                samplers[band].sample(sx, sy).unwrap_or(0.)
            },
        )?;
        Ok(Arc::new(out))
    }

    fn filtered_subsample(
        &self,
        image: &Arc<Raster>,
        params: &SubsampleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        if params.x_factor == 0 || params.y_factor == 0 || params.quadrant.is_empty() {
            return Err(EngineError::invalid_argument(
                Primitive::FilteredSubsample,
                "factors must be positive and the filter non-empty",
            ));
        }
        let taps = params.taps();
        let (fx, fy) = (params.x_factor as f64, params.y_factor as f64);
        let window = params.output_window(&image.window());

        let samplers = samplers(image, interpolation, Some(border));
        let out = render(
            Primitive::FilteredSubsample,
            image.num_bands(),
            window,
            image.sample_type(),
            |band, x, y| {
                // centre of the source block subsampled into (x, y)
                let cx = fx * x as f64 + (fx - 1.) / 2.;
                let cy = fy * y as f64 + (fy - 1.) / 2.;
                let mut acc = 0.;
                for &(dy, wy) in &taps {
                    for &(dx, wx) in &taps {
                        let val = samplers[band]
                            .sample(cx + dx as f64, cy + dy as f64)
                            .unwrap_or(0.);
                        acc += wx * wy * val;
                    }
                }
                acc
            },
        )?;
        Ok(Arc::new(out))
    }
}

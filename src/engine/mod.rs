//! Raster execution service.
//!
//! Operations decide *what* geometric mapping to apply; a
//! [`RasterEngine`] applies it to pixel buffers. Images are
//! shared as `Arc<Raster>` so that primitives which don't
//! touch pixels (translate, full-window crop) can avoid
//! copying.
//!
//! Pixel coordinates handed to the engine are absolute
//! pixel-centre coordinates, see [`crate::geometry`].

use std::fmt;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::geometry::{PixelTransform, PixelWindow};
use crate::interpolation::{BorderExtender, Interpolation};
use crate::raster::Raster;
use crate::transform::MathTransform;

mod memory;
pub use memory::MemoryEngine;

/// Named primitives of a [`RasterEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Crop,
    Translate,
    Affine,
    Warp,
    Scale,
    FilteredSubsample,
}

impl Primitive {
    pub const COUNT: usize = 6;

    pub const ALL: &'static [Primitive] = &[
        Primitive::Crop,
        Primitive::Translate,
        Primitive::Affine,
        Primitive::Warp,
        Primitive::Scale,
        Primitive::FilteredSubsample,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Crop => "Crop",
            Primitive::Translate => "Translate",
            Primitive::Affine => "Affine",
            Primitive::Warp => "Warp",
            Primitive::Scale => "Scale",
            Primitive::FilteredSubsample => "FilteredSubsample",
        };
        f.write_str(name)
    }
}

/// Pixel-space scale and translation, in pixel *edge*
/// coordinates: the edge `u` of the source maps to
/// `u * scale + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub x_scale: f64,
    pub y_scale: f64,
    pub x_trans: f64,
    pub y_trans: f64,
}

impl ScaleParams {
    /// The same mapping in pixel-centre coordinates.
    pub fn to_pixel_transform(&self) -> PixelTransform {
        let cx = self.x_scale * 0.5 + self.x_trans - 0.5;
        let cy = self.y_scale * 0.5 + self.y_trans - 0.5;
        PixelTransform::new(self.x_scale, 0., cx, 0., self.y_scale, cy, 0., 0., 1.)
    }

    /// Window covered by the scaled image of `window`.
    pub fn output_window(&self, window: &PixelWindow) -> PixelWindow {
        let x0 = (window.x as f64 * self.x_scale + self.x_trans).round() as i64;
        let y0 = (window.y as f64 * self.y_scale + self.y_trans).round() as i64;
        let x1 = ((window.max_x() as f64 * self.x_scale + self.x_trans).round() as i64).max(x0);
        let y1 = ((window.max_y() as f64 * self.y_scale + self.y_trans).round() as i64).max(y0);
        PixelWindow::new(x0, y0, (x1 - x0) as usize, (y1 - y0) as usize)
    }
}

/// Integer subsampling with a separable, symmetric filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsampleParams {
    pub x_factor: usize,
    pub y_factor: usize,
    /// One quadrant of the filter: element 0 weighs the
    /// central sample, element `i` the samples `i` pixels
    /// away on either side.
    pub quadrant: Vec<f64>,
}

impl SubsampleParams {
    /// Window of the subsampled image of `window`.
    pub fn output_window(&self, window: &PixelWindow) -> PixelWindow {
        let fx = self.x_factor.max(1);
        let fy = self.y_factor.max(1);
        PixelWindow::new(
            window.x.div_euclid(fx as i64),
            window.y.div_euclid(fy as i64),
            (window.width + fx - 1) / fx,
            (window.height + fy - 1) / fy,
        )
    }

    /// Full symmetric 1D kernel as `(offset, weight)` pairs.
    pub fn taps(&self) -> Vec<(i64, f64)> {
        let n = self.quadrant.len() as i64;
        (1 - n..n)
            .map(|offset| (offset, self.quadrant[offset.unsigned_abs() as usize]))
            .collect()
    }
}

/// Executes geometric primitives over raster images.
pub trait RasterEngine: Send + Sync {
    /// Sub-image covering `window`, keeping absolute pixel
    /// coordinates. `window` must lie within the image.
    fn crop(&self, image: &Arc<Raster>, window: PixelWindow) -> Result<Arc<Raster>, EngineError>;

    /// Same pixels, with the origin moved by `(dx, dy)`.
    fn translate(&self, image: &Arc<Raster>, dx: i64, dy: i64) -> Result<Arc<Raster>, EngineError>;

    /// Resample through the affine map `forward`, taking
    /// source pixel centres to target pixel centres. Target
    /// pixels without a source get `background` (per band).
    /// `layout` is a hint for the output window; engines may
    /// ignore it.
    fn affine(
        &self,
        image: &Arc<Raster>,
        forward: &PixelTransform,
        interpolation: Interpolation,
        background: &[f64],
        layout: Option<PixelWindow>,
    ) -> Result<Arc<Raster>, EngineError>;

    /// Resample over `window` using `target_to_source`, which
    /// maps target pixel centres to source pixel centres.
    fn warp(
        &self,
        image: &Arc<Raster>,
        target_to_source: &MathTransform,
        interpolation: Interpolation,
        background: &[f64],
        window: PixelWindow,
    ) -> Result<Arc<Raster>, EngineError>;

    /// Scale and translate in pixel space, synthesising
    /// samples past the image edges with `border`.
    fn scale(
        &self,
        image: &Arc<Raster>,
        params: &ScaleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError>;

    /// Filter, then keep one sample out of every
    /// `x_factor * y_factor`.
    fn filtered_subsample(
        &self,
        image: &Arc<Raster>,
        params: &SubsampleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError>;
}

impl<E: RasterEngine + ?Sized> RasterEngine for Arc<E> {
    fn crop(&self, image: &Arc<Raster>, window: PixelWindow) -> Result<Arc<Raster>, EngineError> {
        (**self).crop(image, window)
    }

    fn translate(&self, image: &Arc<Raster>, dx: i64, dy: i64) -> Result<Arc<Raster>, EngineError> {
        (**self).translate(image, dx, dy)
    }

    fn affine(
        &self,
        image: &Arc<Raster>,
        forward: &PixelTransform,
        interpolation: Interpolation,
        background: &[f64],
        layout: Option<PixelWindow>,
    ) -> Result<Arc<Raster>, EngineError> {
        (**self).affine(image, forward, interpolation, background, layout)
    }

    fn warp(
        &self,
        image: &Arc<Raster>,
        target_to_source: &MathTransform,
        interpolation: Interpolation,
        background: &[f64],
        window: PixelWindow,
    ) -> Result<Arc<Raster>, EngineError> {
        (**self).warp(image, target_to_source, interpolation, background, window)
    }

    fn scale(
        &self,
        image: &Arc<Raster>,
        params: &ScaleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        (**self).scale(image, params, interpolation, border)
    }

    fn filtered_subsample(
        &self,
        image: &Arc<Raster>,
        params: &SubsampleParams,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Raster>, EngineError> {
        (**self).filtered_subsample(image, params, interpolation, border)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::apply;

    #[test]
    fn test_scale_params_centre_convention() {
        let params = ScaleParams {
            x_scale: 2.,
            y_scale: 2.,
            x_trans: 0.,
            y_trans: 0.,
        };
        // pixel 0 covers edges [0, 1] -> [0, 2]: centre 0.5
        assert_eq!(apply(&params.to_pixel_transform(), 0., 0.), (0.5, 0.5));
        assert_eq!(
            params.output_window(&PixelWindow::new(0, 0, 10, 5)),
            PixelWindow::new(0, 0, 20, 10)
        );
    }

    #[test]
    fn test_subsample_window_and_taps() {
        let params = SubsampleParams {
            x_factor: 2,
            y_factor: 3,
            quadrant: vec![0.5, 0.25],
        };
        assert_eq!(
            params.output_window(&PixelWindow::new(0, 0, 9, 9)),
            PixelWindow::new(0, 0, 5, 3)
        );
        assert_eq!(params.taps(), vec![(-1, 0.25), (0, 0.5), (1, 0.25)]);
    }

    #[test]
    fn test_primitive_index() {
        for (idx, p) in Primitive::ALL.iter().enumerate() {
            assert_eq!(p.index(), idx);
        }
        assert_eq!(Primitive::ALL.len(), Primitive::COUNT);
        assert_eq!(Primitive::FilteredSubsample.to_string(), "FilteredSubsample");
    }
}

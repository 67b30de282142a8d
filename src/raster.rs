//! In-memory multi-band raster images.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde_derive::{Deserialize, Serialize};

use crate::geometry::PixelWindow;

/// Numeric encoding of the samples of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    UInt8,
    Int16,
    UInt16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    #[inline]
    pub fn is_floating(self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }

    /// Representable range of an integer type.
    fn bounds(self) -> Option<(f64, f64)> {
        match self {
            SampleType::UInt8 => Some((u8::MIN as f64, u8::MAX as f64)),
            SampleType::Int16 => Some((i16::MIN as f64, i16::MAX as f64)),
            SampleType::UInt16 => Some((u16::MIN as f64, u16::MAX as f64)),
            SampleType::Int32 => Some((i32::MIN as f64, i32::MAX as f64)),
            SampleType::Float32 | SampleType::Float64 => None,
        }
    }

    /// Round and clamp `val` to a value representable by this
    /// type. NaN is kept as-is for floating types and mapped
    /// to zero for integer types.
    pub fn quantize(self, val: f64) -> f64 {
        match self.bounds() {
            None if self == SampleType::Float32 => val as f32 as f64,
            None => val,
            Some(_) if val.is_nan() => 0.,
            Some((min, max)) => val.round().max(min).min(max),
        }
    }
}

/// A multi-band image. Samples are stored as `f64` in a
/// `(band, row, column)` array, tagged with the sample type
/// of the encoding they represent. The image origin is the
/// absolute pixel coordinate of its top-left sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    data: Array3<f64>,
    origin: (i64, i64),
    sample_type: SampleType,
}

impl Raster {
    pub fn new(data: Array3<f64>, sample_type: SampleType) -> Self {
        Raster {
            data,
            origin: (0, 0),
            sample_type,
        }
    }

    /// Single band raster.
    pub fn from_band(band: Array2<f64>, sample_type: SampleType) -> Self {
        Raster::new(band.insert_axis(Axis(0)), sample_type)
    }

    /// Raster of the given size filled with `value`.
    pub fn filled(bands: usize, width: usize, height: usize, value: f64, sample_type: SampleType) -> Self {
        Raster::new(Array3::from_elem((bands, height, width), value), sample_type)
    }

    pub fn with_origin(mut self, x: i64, y: i64) -> Self {
        self.origin = (x, y);
        self
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.data.dim().0
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    #[inline]
    pub fn origin(&self) -> (i64, i64) {
        self.origin
    }

    #[inline]
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Absolute pixel bounds of the image.
    pub fn window(&self) -> PixelWindow {
        PixelWindow::new(self.origin.0, self.origin.1, self.width(), self.height())
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }

    pub fn band(&self, band: usize) -> ArrayView2<'_, f64> {
        self.data.slice(s![band, .., ..])
    }

    /// Sample at absolute pixel coordinates.
    pub fn get(&self, band: usize, x: i64, y: i64) -> Option<f64> {
        let col = x - self.origin.0;
        let row = y - self.origin.1;
        if col < 0 || row < 0 {
            return None;
        }
        self.data.get((band, row as usize, col as usize)).copied()
    }

    /// Same samples, with the origin moved by `(dx, dy)`.
    pub fn translated(&self, dx: i64, dy: i64) -> Raster {
        Raster {
            data: self.data.clone(),
            origin: (self.origin.0 + dx, self.origin.1 + dy),
            sample_type: self.sample_type,
        }
    }

    /// Copy of `self` with every sample replaced by
    /// `f(band, value)`, re-encoded as `sample_type`.
    pub fn map_bands<F: Fn(usize, f64) -> f64>(&self, sample_type: SampleType, f: F) -> Raster {
        let mut data = self.data.clone();
        for (band, mut plane) in data.outer_iter_mut().enumerate() {
            plane.mapv_inplace(|v| sample_type.quantize(f(band, v)));
        }
        Raster {
            data,
            origin: self.origin,
            sample_type,
        }
    }
}

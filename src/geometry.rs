//! Pixel windows, grid ranges and envelopes.
//!
//! Grid-to-CRS transforms in this crate map pixel *centres*:
//! the integer grid coordinate `i` is the centre of pixel
//! `i`, and the pixel covers `[i - ½, i + ½]`. A
//! [`GridRange`] `[lo, hi)` therefore covers the continuous
//! box `[lo - ½, hi - ½]`. GDAL geotransforms, on the other
//! hand, map pixel corners; [`PixelInCell`] converts between
//! the two.

use geo::Rect;
use nalgebra::{Matrix3, Point2};
use serde_derive::{Deserialize, Serialize};

use crate::crs::Crs;

/// Affine transform between 2D pixel and world coordinates,
/// as a homogeneous 3x3 matrix.
pub type PixelTransform = Matrix3<f64>;

/// Convert a GDAL geotransform `[c, a, b, f, d, e]` into a
/// [`PixelTransform`]. The result maps pixel *corners*.
pub fn transform_from_gdal(t: &[f64; 6]) -> PixelTransform {
    Matrix3::new(t[1], t[2], t[0], t[4], t[5], t[3], 0., 0., 1.)
}

/// Convert a [`PixelTransform`] back into a GDAL geotransform.
pub fn transform_to_gdal(t: &PixelTransform) -> [f64; 6] {
    [t[(0, 2)], t[(0, 0)], t[(0, 1)], t[(1, 2)], t[(1, 0)], t[(1, 1)]]
}

/// Which point of a pixel a grid-to-CRS transform maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelInCell {
    Center,
    Corner,
}

impl PixelInCell {
    /// Offset to add to a pixel-centre grid coordinate to
    /// obtain the coordinate expected by a transform anchored
    /// at `self`.
    pub fn offset_from_center(self) -> f64 {
        match self {
            PixelInCell::Center => 0.,
            PixelInCell::Corner => 0.5,
        }
    }
}

/// Rectangle of pixels in absolute image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        PixelWindow {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn max_x(&self) -> i64 {
        self.x + self.width as i64
    }

    #[inline]
    pub fn max_y(&self) -> i64 {
        self.y + self.height as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, other: &PixelWindow) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Intersection of two windows; empty windows are
    /// reported as `None`.
    pub fn intersection(&self, other: &PixelWindow) -> Option<PixelWindow> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if max_x <= x || max_y <= y {
            return None;
        }
        Some(PixelWindow::new(
            x,
            y,
            (max_x - x) as usize,
            (max_y - y) as usize,
        ))
    }
}

/// Conversion of continuous pixel-edge bounds into pixel
/// windows.
pub trait BoundsExt {
    /// The window of pixels whose extent lies inside `self`.
    /// Edges within `1e-6` of an integer count as on it.
    /// Bounds holding no whole pixel give an empty window.
    fn inner_window(&self) -> PixelWindow;
}

impl BoundsExt for Rect<f64> {
    fn inner_window(&self) -> PixelWindow {
        const EPS: f64 = 1e-6;
        let min = self.min();
        let max = self.max();
        let x = (min.x - EPS).ceil() as i64;
        let y = (min.y - EPS).ceil() as i64;
        let max_x = ((max.x + EPS).floor() as i64).max(x);
        let max_y = ((max.y + EPS).floor() as i64).max(y);
        PixelWindow::new(x, y, (max_x - x) as usize, (max_y - y) as usize)
    }
}

/// Integer bounds of a grid, per axis. Lower bounds are
/// inclusive, upper bounds exclusive. Axes 0 and 1 are the
/// image axes; any further axis must span a single cell for
/// the grid to back a raster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRange {
    lower: Vec<i64>,
    upper: Vec<i64>,
}

impl GridRange {
    /// Construct a range from per-axis bounds.
    ///
    /// # Panics
    ///
    /// Panics if the bounds have different or less than two
    /// dimensions, or if some upper bound is below its lower
    /// bound.
    pub fn new(lower: Vec<i64>, upper: Vec<i64>) -> Self {
        assert!(
            lower.len() == upper.len() && lower.len() >= 2,
            "grid range needs at least two axes with matching bounds"
        );
        assert!(
            lower.iter().zip(upper.iter()).all(|(l, u)| l <= u),
            "grid range upper bounds must not be below lower bounds"
        );
        GridRange { lower, upper }
    }

    /// A two dimensional range covering `window`.
    pub fn from_window(window: PixelWindow) -> Self {
        GridRange {
            lower: vec![window.x, window.y],
            upper: vec![window.max_x(), window.max_y()],
        }
    }

    /// A two dimensional range `[0, width) x [0, height)`.
    pub fn with_dims(width: usize, height: usize) -> Self {
        Self::from_window(PixelWindow::new(0, 0, width, height))
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    #[inline]
    pub fn lower(&self, axis: usize) -> i64 {
        self.lower[axis]
    }

    #[inline]
    pub fn upper(&self, axis: usize) -> i64 {
        self.upper[axis]
    }

    #[inline]
    pub fn span(&self, axis: usize) -> usize {
        (self.upper[axis] - self.lower[axis]) as usize
    }

    pub fn is_empty(&self) -> bool {
        (0..self.dimension()).any(|axis| self.span(axis) == 0)
    }

    /// The image axes (0 and 1) as a pixel window.
    pub fn window(&self) -> PixelWindow {
        PixelWindow::new(self.lower[0], self.lower[1], self.span(0), self.span(1))
    }

    /// Copy of `self` with the image axes replaced by `window`.
    pub fn with_window(&self, window: PixelWindow) -> Self {
        let mut range = self.clone();
        range.lower[0] = window.x;
        range.lower[1] = window.y;
        range.upper[0] = window.max_x();
        range.upper[1] = window.max_y();
        range
    }

    /// Continuous pixel-centre box covered by the range:
    /// `[lo - ½, hi - ½]` per axis.
    pub fn to_box(&self) -> (Vec<f64>, Vec<f64>) {
        let lower = self.lower.iter().map(|&l| l as f64 - 0.5).collect();
        let upper = self.upper.iter().map(|&u| u as f64 - 0.5).collect();
        (lower, upper)
    }

    /// Inverse of [`to_box`][GridRange::to_box]: applies the
    /// half-pixel correction and rounds each edge.
    pub fn from_box(lower: &[f64], upper: &[f64]) -> Self {
        let lower: Vec<i64> = lower.iter().map(|&l| (l + 0.5).round() as i64).collect();
        let upper = upper
            .iter()
            .zip(lower.iter())
            .map(|(&u, &l)| ((u + 0.5).round() as i64).max(l))
            .collect();
        GridRange::new(lower, upper)
    }
}

/// Axis-aligned bounding box, optionally tagged with its CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    lower: Vec<f64>,
    upper: Vec<f64>,
    crs: Option<Crs>,
}

impl Envelope {
    /// # Panics
    ///
    /// Panics if the corners have different or less than two
    /// dimensions.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert!(
            lower.len() == upper.len() && lower.len() >= 2,
            "envelope needs at least two axes with matching corners"
        );
        Envelope {
            lower,
            upper,
            crs: None,
        }
    }

    /// Two dimensional envelope from a `geo` rectangle.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Envelope::new(vec![min.x, min.y], vec![max.x, max.y])
    }

    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    #[inline]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    #[inline]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// The first two axes as a `geo` rectangle.
    pub fn rect(&self) -> Rect<f64> {
        Rect::new((self.lower[0], self.lower[1]), (self.upper[0], self.upper[1]))
    }

    /// True if some axis has no extent.
    pub fn is_empty(&self) -> bool {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .any(|(l, u)| !(u > l))
    }

    /// Component-wise intersection. The result may be empty;
    /// check with [`is_empty`][Envelope::is_empty]. The CRS of
    /// `self` is kept.
    pub fn intersection(&self, other: &Envelope) -> Envelope {
        let lower = self
            .lower
            .iter()
            .zip(other.lower.iter())
            .map(|(a, b)| a.max(*b))
            .collect();
        let upper = self
            .upper
            .iter()
            .zip(other.upper.iter())
            .map(|(a, b)| a.min(*b))
            .collect();
        Envelope {
            lower,
            upper,
            crs: self.crs.clone(),
        }
    }

    /// True if `other` lies within `self`, up to `eps`.
    pub fn contains(&self, other: &Envelope, eps: f64) -> bool {
        self.lower
            .iter()
            .zip(other.lower.iter())
            .all(|(a, b)| *b >= a - eps)
            && self
                .upper
                .iter()
                .zip(other.upper.iter())
                .all(|(a, b)| *b <= a + eps)
    }

    /// Corner-wise comparison up to `eps`, ignoring the CRS.
    pub fn approx_eq(&self, other: &Envelope, eps: f64) -> bool {
        self.dimension() == other.dimension()
            && self
                .lower
                .iter()
                .chain(self.upper.iter())
                .zip(other.lower.iter().chain(other.upper.iter()))
                .all(|(a, b)| (a - b).abs() <= eps)
    }

    /// All `2^n` corners of the box.
    pub fn corners(&self) -> Vec<Vec<f64>> {
        let dim = self.dimension();
        (0..(1usize << dim))
            .map(|mask| {
                (0..dim)
                    .map(|axis| {
                        if mask & (1 << axis) == 0 {
                            self.lower[axis]
                        } else {
                            self.upper[axis]
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Bounding box of a set of points, as `(lower, upper)`.
pub(crate) fn bounding_box<I: IntoIterator<Item = Vec<f64>>>(
    points: I,
    dim: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut lower = vec![f64::INFINITY; dim];
    let mut upper = vec![f64::NEG_INFINITY; dim];
    for pt in points {
        for axis in 0..dim {
            lower[axis] = lower[axis].min(pt[axis]);
            upper[axis] = upper[axis].max(pt[axis]);
        }
    }
    (lower, upper)
}

/// Apply a 2D pixel transform to a point.
#[inline]
pub fn apply(t: &PixelTransform, x: f64, y: f64) -> (f64, f64) {
    let pt = t.transform_point(&Point2::new(x, y));
    (pt.x, pt.y)
}

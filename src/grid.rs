//! Grid geometry: grid range, grid-to-CRS transform and CRS.
//!
//! Each of the three parts is optional. A fully defined
//! geometry describes a coverage; a partial one describes a
//! request whose missing parts the engine infers (see
//! [`GridGeometry::infer_range`] and
//! [`GridGeometry::fit_transform`]).

use crate::crs::{same_crs, Crs};
use crate::error::TransformError;
use crate::geometry::{Envelope, GridRange, PixelInCell};
use crate::transform::MathTransform;

/// Tolerance used when comparing grid-to-CRS transforms.
pub const TRANSFORM_EPS: f64 = 1e-9;

/// Pixel-index range, pixel-centre to CRS transform, and CRS;
/// any of which may be left undefined.
#[derive(Debug, Clone, Default)]
pub struct GridGeometry {
    range: Option<GridRange>,
    grid_to_crs: Option<MathTransform>,
    crs: Option<Crs>,
}

impl GridGeometry {
    /// Fully defined geometry. The transform must map pixel
    /// centres.
    pub fn new(range: GridRange, grid_to_crs: MathTransform, crs: Option<Crs>) -> Self {
        GridGeometry {
            range: Some(range),
            grid_to_crs: Some(grid_to_crs),
            crs,
        }
    }

    /// Fully defined geometry whose transform is anchored at
    /// `anchor`. Corner-anchored transforms (eg. GDAL
    /// geotransforms) are shifted by half a pixel.
    pub fn with_anchor(
        range: GridRange,
        grid_to_crs: MathTransform,
        anchor: PixelInCell,
        crs: Option<Crs>,
    ) -> Result<Self, TransformError> {
        let dim = grid_to_crs.source_dimension();
        let offset = anchor.offset_from_center();
        let center = MathTransform::translation(&vec![offset; dim]).then(&grid_to_crs)?;
        Ok(GridGeometry::new(range, center, crs))
    }

    /// Geometry mapping `range` onto `envelope` with an
    /// axis-aligned transform. No axis is reversed.
    pub fn from_envelope(range: GridRange, envelope: &Envelope) -> Self {
        let reversed = vec![false; range.dimension()];
        let grid_to_crs = Self::fit_transform(&range, envelope, &reversed);
        GridGeometry::new(range, grid_to_crs, envelope.crs().cloned())
    }

    /// Only a grid range; transform and CRS to be inferred.
    pub fn from_range(range: GridRange) -> Self {
        GridGeometry {
            range: Some(range),
            ..Default::default()
        }
    }

    /// Only a grid-to-CRS transform; range to be inferred.
    pub fn from_transform(grid_to_crs: MathTransform, crs: Option<Crs>) -> Self {
        GridGeometry {
            grid_to_crs: Some(grid_to_crs),
            crs,
            ..Default::default()
        }
    }

    pub fn range(&self) -> Option<&GridRange> {
        self.range.as_ref()
    }

    pub fn grid_to_crs(&self) -> Option<&MathTransform> {
        self.grid_to_crs.as_ref()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn with_range(mut self, range: GridRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    /// True if range and transform are both defined.
    pub fn is_complete(&self) -> bool {
        self.range.is_some() && self.grid_to_crs.is_some()
    }

    /// Envelope covered by the grid range, when both range
    /// and transform are defined.
    pub fn envelope(&self) -> Option<Result<Envelope, TransformError>> {
        let range = self.range.as_ref()?;
        let transform = self.grid_to_crs.as_ref()?;
        let (lower, upper) = range.to_box();
        Some(
            transform
                .transform_envelope(&Envelope::new(lower, upper))
                .map(|env| env.with_crs(self.crs.clone())),
        )
    }

    /// Compare two geometries, ignoring parts undefined on
    /// either side and CRS metadata.
    pub fn equivalent(&self, other: &GridGeometry) -> bool {
        if let (Some(a), Some(b)) = (&self.range, &other.range) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.grid_to_crs, &other.grid_to_crs) {
            if !a.approx_eq(b, TRANSFORM_EPS) {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.crs, &other.crs) {
            if !same_crs(Some(a), Some(b)) {
                return false;
            }
        }
        true
    }

    /// Grid range covering `envelope` under `grid_to_crs`.
    /// The envelope is mapped into pixel-centre space, then
    /// shifted by half a pixel so that the bounds fall on
    /// pixel edges before rounding.
    pub fn infer_range(envelope: &Envelope, grid_to_crs: &MathTransform) -> Result<GridRange, TransformError> {
        let inverse = grid_to_crs.inverse()?;
        let pixels = inverse.transform_envelope(envelope)?;
        Ok(GridRange::from_box(pixels.lower(), pixels.upper()))
    }

    /// Axis-aligned transform mapping the pixel centres of
    /// `range` so that its edges coincide with `envelope`.
    /// Axes flagged in `reversed` map increasing grid indices
    /// to decreasing coordinates.
    pub fn fit_transform(range: &GridRange, envelope: &Envelope, reversed: &[bool]) -> MathTransform {
        let dim = range.dimension();
        let mut scales = Vec::with_capacity(dim);
        let mut offsets = Vec::with_capacity(dim);
        for axis in 0..dim {
            let span = range.span(axis).max(1) as f64;
            let (lo, hi) = (envelope.lower()[axis], envelope.upper()[axis]);
            let scale = (hi - lo) / span;
            // pixel edge (range.lower - ½) sits on lo, or on hi
            // when the axis is reversed.
            let edge = range.lower(axis) as f64 - 0.5;
            if reversed.get(axis).copied().unwrap_or(false) {
                scales.push(-scale);
                offsets.push(hi + scale * edge);
            } else {
                scales.push(scale);
                offsets.push(lo - scale * edge);
            }
        }
        MathTransform::scale_translate(&scales, &offsets)
    }

    /// Which axes of `grid_to_crs` map increasing indices to
    /// decreasing coordinates (negative diagonal).
    pub fn reversed_axes(grid_to_crs: &MathTransform) -> Vec<bool> {
        let dim = grid_to_crs.source_dimension();
        match grid_to_crs.matrix() {
            Some(m) => (0..dim)
                .map(|axis| axis < m.nrows() - 1 && m[(axis, axis)] < 0.)
                .collect(),
            None => vec![false; dim],
        }
    }
}

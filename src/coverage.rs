//! Coverages: rasters with a grid geometry and band metadata.
//!
//! Coverages are immutable and shared as `Arc<Coverage>`. A
//! coverage produced by an operation keeps read-only
//! references to the coverages it was derived from, and a
//! [`Derivation`] tag naming how; together these form a DAG
//! that [`Resample`][crate::operation::Resample] walks to
//! collapse chains of resampling.

use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::band::{background_values, SampleDimension, View};
use crate::crs::Crs;
use crate::error::{CoverageError, Result};
use crate::geometry::{Envelope, GridRange};
use crate::grid::GridGeometry;
use crate::raster::{Raster, SampleType};
use crate::transform::MathTransform;

/// How a coverage was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Derivation {
    /// Constructed directly, not by an operation.
    Original,
    Cropped,
    Scaled,
    Subsampled,
    Resampled,
    /// Same samples in the other [`View`].
    Converted,
}

/// A raster image positioned in a CRS.
#[derive(Debug)]
pub struct Coverage {
    name: String,
    raster: Arc<Raster>,
    grid_geometry: GridGeometry,
    range: GridRange,
    grid_to_crs: MathTransform,
    envelope: Envelope,
    bands: Vec<SampleDimension>,
    view: View,
    derivation: Derivation,
    sources: Vec<Arc<Coverage>>,
}

impl Coverage {
    /// Original coverage in the geophysics view.
    ///
    /// The grid geometry must be complete, its first two axes
    /// must match the raster bounds, further axes must span
    /// a single cell, and there must be one sample dimension
    /// per band.
    pub fn new(
        name: impl Into<String>,
        raster: impl Into<Arc<Raster>>,
        grid_geometry: GridGeometry,
        bands: Vec<SampleDimension>,
    ) -> Result<Self> {
        Coverage::derived(
            name,
            raster.into(),
            grid_geometry,
            bands,
            View::Geophysics,
            Derivation::Original,
            vec![],
        )
    }

    /// Coverage derived from `sources`.
    pub fn derived(
        name: impl Into<String>,
        raster: Arc<Raster>,
        grid_geometry: GridGeometry,
        bands: Vec<SampleDimension>,
        view: View,
        derivation: Derivation,
        sources: Vec<Arc<Coverage>>,
    ) -> Result<Self> {
        let range = grid_geometry
            .range()
            .ok_or_else(|| CoverageError::invalid_coverage("grid range is undefined"))?;
        let transform = grid_geometry
            .grid_to_crs()
            .ok_or_else(|| CoverageError::invalid_coverage("grid to CRS transform is undefined"))?;

        if range.window() != raster.window() {
            return Err(CoverageError::invalid_coverage(format!(
                "grid range {:?} does not match raster bounds {:?}",
                range.window(),
                raster.window()
            )));
        }
        if (2..range.dimension()).any(|axis| range.span(axis) != 1) {
            return Err(CoverageError::invalid_coverage(
                "grid axes beyond the first two must span a single cell",
            ));
        }
        if transform.source_dimension() != range.dimension() {
            return Err(CoverageError::invalid_coverage(format!(
                "{}D grid range with a transform from {}D",
                range.dimension(),
                transform.source_dimension()
            )));
        }
        if let Some(crs) = grid_geometry.crs() {
            if crs.dimension() != transform.target_dimension() {
                return Err(CoverageError::invalid_coverage(format!(
                    "{}D CRS {} with a transform to {}D",
                    crs.dimension(),
                    crs,
                    transform.target_dimension()
                )));
            }
        }
        if bands.len() != raster.num_bands() {
            return Err(CoverageError::invalid_coverage(format!(
                "{} sample dimensions for {} bands",
                bands.len(),
                raster.num_bands()
            )));
        }

        let (lower, upper) = range.to_box();
        let envelope = transform
            .transform_envelope(&Envelope::new(lower, upper))
            .map_err(|e| CoverageError::invalid_coverage(e.to_string()))?
            .with_crs(grid_geometry.crs().cloned());
        let range = range.clone();
        let grid_to_crs = transform.clone();

        Ok(Coverage {
            name: name.into(),
            raster,
            grid_geometry,
            range,
            grid_to_crs,
            envelope,
            bands,
            view,
            derivation,
            sources,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raster(&self) -> &Arc<Raster> {
        &self.raster
    }

    /// Complete grid geometry of the coverage.
    pub fn grid_geometry(&self) -> &GridGeometry {
        &self.grid_geometry
    }

    pub fn grid_range(&self) -> &GridRange {
        &self.range
    }

    pub fn grid_to_crs(&self) -> &MathTransform {
        &self.grid_to_crs
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.grid_geometry.crs()
    }

    /// Envelope of the grid range, tagged with the CRS.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sample_dimensions(&self) -> &[SampleDimension] {
        &self.bands
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn derivation(&self) -> Derivation {
        self.derivation
    }

    pub fn sources(&self) -> &[Arc<Coverage>] {
        &self.sources
    }

    /// Fill value of every band, in the current view.
    pub fn background(&self) -> Vec<f64> {
        background_values(&self.bands, self.view, self.raster.sample_type())
    }

    /// True if some band has a packed encoding distinct from
    /// its geophysics values.
    pub fn has_packed_view(&self) -> bool {
        self.bands.iter().any(|band| band.transfer().is_some())
    }

    /// The packed view of this coverage. Returns `self` when
    /// already packed or when no band has a packed encoding.
    /// Bands must share a packed type to be encoded as it;
    /// otherwise the raster keeps its own sample type.
    pub fn packed(self: &Arc<Self>) -> Result<Arc<Coverage>> {
        if self.view == View::Packed || !self.has_packed_view() {
            return Ok(self.clone());
        }
        if let Some(source) = self.converted_from(View::Packed) {
            return Ok(source);
        }
        let sample_type = self.packed_type().unwrap_or_else(|| self.raster.sample_type());
        self.convert(View::Packed, sample_type)
    }

    /// The packed view, if decoding it gives back every sample
    /// of this geophysics view. Missing samples only need to
    /// stay missing.
    pub fn lossless_packed(self: &Arc<Self>) -> Result<Option<Arc<Coverage>>> {
        if self.view == View::Packed {
            return Ok(Some(self.clone()));
        }
        if let Some(source) = self.converted_from(View::Packed) {
            return Ok(Some(source));
        }
        let sample_type = match self.packed_type() {
            Some(sample_type) => sample_type,
            None => return Ok(None),
        };
        let packed = self.convert(View::Packed, sample_type)?;

        let own_type = self.raster.sample_type();
        let lossless = self
            .raster
            .data()
            .indexed_iter()
            .zip(packed.raster().data().iter())
            .all(|(((b, _, _), &val), &code)| {
                let band = &self.bands[b];
                let back = own_type.quantize(band.to_geophysics(code));
                back == val || (band.is_missing(val) && band.is_missing(back))
            });
        Ok(if lossless { Some(packed) } else { None })
    }

    /// Packed sample type shared by all bands; `None` if a
    /// band has no packed encoding or the types differ.
    fn packed_type(&self) -> Option<SampleType> {
        let mut types = self.bands.iter().map(|band| band.transfer().map(|t| t.packed_type));
        let first = types.next()??;
        types.all(|t| t == Some(first)).then(|| first)
    }

    /// The geophysics view of this coverage.
    pub fn geophysics(self: &Arc<Self>) -> Result<Arc<Coverage>> {
        if self.view == View::Geophysics {
            return Ok(self.clone());
        }
        if let Some(source) = self.converted_from(View::Geophysics) {
            return Ok(source);
        }
        self.convert(View::Geophysics, SampleType::Float64)
    }

    /// Re-encode the samples in `view`, as `sample_type`.
    pub fn convert(self: &Arc<Self>, view: View, sample_type: SampleType) -> Result<Arc<Coverage>> {
        if view == self.view {
            return Ok(self.clone());
        }
        let bands = &self.bands;
        let raster = match view {
            View::Packed => self
                .raster
                .map_bands(sample_type, |band, val| bands[band].to_packed(val)),
            View::Geophysics => self
                .raster
                .map_bands(sample_type, |band, val| bands[band].to_geophysics(val)),
        };
        let coverage = Coverage::derived(
            self.name.clone(),
            Arc::new(raster),
            self.grid_geometry.clone(),
            self.bands.clone(),
            view,
            Derivation::Converted,
            vec![self.clone()],
        )?;
        Ok(Arc::new(coverage))
    }

    /// The source of a view conversion, if it is in `view`.
    fn converted_from(&self, view: View) -> Option<Arc<Coverage>> {
        match (self.derivation, self.sources.first()) {
            (Derivation::Converted, Some(source)) if source.view == view => Some(source.clone()),
            _ => None,
        }
    }
}

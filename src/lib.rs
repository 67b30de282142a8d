//! Geo-referenced raster coverages and the operations that
//! transform them: [`Crop`][operation::Crop],
//! [`Scale`][operation::Scale],
//! [`FilteredSubsample`][operation::FilteredSubsample] and
//! [`Resample`][operation::Resample].
//!
//! A [`Coverage`][coverage::Coverage] pairs a raster image
//! with a [`GridGeometry`][grid::GridGeometry] that positions
//! it in a coordinate reference system. Operations never
//! touch pixels themselves; they compute the geometry of
//! their result and delegate the pixel work to a
//! [`RasterEngine`][engine::RasterEngine]. The
//! [`Processor`][processor::Processor] runs operations by
//! name from a [`ParameterGroup`][parameters::ParameterGroup].

pub mod band;
pub mod config;
pub mod coverage;
pub mod crs;
#[cfg(feature = "gdal")]
pub mod dataset;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod interpolation;
pub mod operation;
pub mod parameters;
pub mod processor;
pub mod raster;
pub mod resampler;
pub mod transform;

pub mod prelude;

#[cfg(test)]
mod testing;

pub use error::{CoverageError, Result};

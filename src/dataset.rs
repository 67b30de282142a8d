//! Read GDAL datasets into coverages.

use std::path::Path;

use anyhow::{format_err, Context, Result};
use gdal::raster::GdalDataType;
use gdal::{Dataset, Metadata};
use ndarray::{Array2, Array3, Axis};

use crate::band::{NumberRange, SampleDimension};
use crate::coverage::Coverage;
use crate::crs::Crs;
use crate::geometry::{transform_from_gdal, GridRange, PixelInCell};
use crate::grid::GridGeometry;
use crate::raster::{Raster, SampleType};
use crate::transform::MathTransform;

fn sample_type(ty: GdalDataType) -> SampleType {
    match ty {
        GdalDataType::UInt8 => SampleType::UInt8,
        GdalDataType::Int16 => SampleType::Int16,
        GdalDataType::UInt16 => SampleType::UInt16,
        GdalDataType::Int32 => SampleType::Int32,
        GdalDataType::Float32 => SampleType::Float32,
        _ => SampleType::Float64,
    }
}

/// Read every band of the dataset at `path` into a coverage.
/// The geotransform is corner-anchored; the projection, when
/// set, becomes a two-dimensional CRS identified by its WKT.
pub fn read_coverage<P: AsRef<Path>>(path: P) -> Result<Coverage> {
    let path = path.as_ref();
    let ds = Dataset::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (width, height) = ds.raster_size();
    let count = ds.raster_count();
    if count < 1 {
        return Err(format_err!("{}: dataset has no raster band", path.display()));
    }

    let corner = MathTransform::from_pixel_transform(&transform_from_gdal(&ds.geo_transform()?));
    let projection = ds.projection();
    let crs = if projection.is_empty() {
        None
    } else {
        Some(Crs::new(projection, 2))
    };
    let gg = GridGeometry::with_anchor(GridRange::with_dims(width, height), corner, PixelInCell::Corner, crs)?;

    let mut data = Array3::zeros((count as usize, height, width));
    let mut bands = Vec::with_capacity(count as usize);
    let mut ty = SampleType::UInt8;
    for idx in 1..=count {
        let band = ds.rasterband(idx)?;
        let buf = band
            .read_as::<f64>((0, 0), (width, height), (width, height), None)
            .with_context(|| format!("reading band {} ({}x{})", idx, width, height))?;
        let arr = Array2::from_shape_vec((height, width), buf.data)?;
        data.index_axis_mut(Axis(0), idx as usize - 1).assign(&arr);

        // widest type across bands
        let band_ty = sample_type(band.band_type());
        if band_ty as usize > ty as usize {
            ty = band_ty;
        }

        let description = band.description().unwrap_or_default();
        let mut dim = SampleDimension::new(if description.is_empty() {
            format!("band {}", idx)
        } else {
            description
        });
        if let Some(no_data) = band.no_data_value() {
            dim = dim.with_no_data(NumberRange::singleton(no_data));
        }
        bands.push(dim);
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Coverage::new(name, Raster::new(data, ty), gg, bands)?)
}

//! Per-band metadata: no-data ranges, packed encodings, and
//! the background value used to fill pixels without a source.

use serde_derive::{Deserialize, Serialize};

use crate::raster::SampleType;

/// A range of numbers with independently open or closed ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl NumberRange {
    pub fn new(min: f64, max: f64, min_inclusive: bool, max_inclusive: bool) -> Self {
        NumberRange {
            min,
            max,
            min_inclusive,
            max_inclusive,
        }
    }

    /// Closed range `[min, max]`.
    pub fn inclusive(min: f64, max: f64) -> Self {
        NumberRange::new(min, max, true, true)
    }

    /// Closed range holding a single value.
    pub fn singleton(val: f64) -> Self {
        NumberRange::inclusive(val, val)
    }

    pub fn contains(&self, val: f64) -> bool {
        if self.min.is_nan() && self.max.is_nan() {
            return val.is_nan();
        }
        let above = if self.min_inclusive {
            val >= self.min
        } else {
            val > self.min
        };
        let below = if self.max_inclusive {
            val <= self.max
        } else {
            val < self.max
        };
        above && below
    }

    /// Representative value of the range: the minimum if it
    /// is included, else the maximum if it is included, else
    /// the midpoint.
    pub fn representative(&self) -> f64 {
        if self.min_inclusive {
            self.min
        } else if self.max_inclusive {
            self.max
        } else {
            (self.min + self.max) / 2.
        }
    }
}

/// Which encoding a coverage exposes its samples in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    /// Measured values (eg. temperature in °C).
    Geophysics,
    /// Integer codes, related to the measured value by a
    /// [`Transfer`].
    Packed,
}

/// Linear relation `value = packed * scale + offset` between
/// the packed and the geophysics encoding of a band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub scale: f64,
    pub offset: f64,
    pub packed_type: SampleType,
    /// Codes that denote missing data in the packed encoding.
    pub packed_no_data: Option<NumberRange>,
}

impl Transfer {
    pub fn new(scale: f64, offset: f64, packed_type: SampleType) -> Self {
        Transfer {
            scale,
            offset,
            packed_type,
            packed_no_data: None,
        }
    }

    pub fn with_packed_no_data(mut self, range: NumberRange) -> Self {
        self.packed_no_data = Some(range);
        self
    }
}

/// Description of one band of a coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDimension {
    description: String,
    no_data: Option<NumberRange>,
    transfer: Option<Transfer>,
}

impl SampleDimension {
    pub fn new(description: impl Into<String>) -> Self {
        SampleDimension {
            description: description.into(),
            no_data: None,
            transfer: None,
        }
    }

    /// No-data range, in geophysics values.
    pub fn with_no_data(mut self, range: NumberRange) -> Self {
        self.no_data = Some(range);
        self
    }

    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// No-data range as seen in `view`.
    pub fn no_data(&self, view: View) -> Option<NumberRange> {
        match view {
            View::Geophysics => self.no_data,
            View::Packed => self.transfer.and_then(|t| t.packed_no_data),
        }
    }

    /// True if the geophysics value `val` denotes missing data.
    pub fn is_missing(&self, val: f64) -> bool {
        val.is_nan() || self.no_data.map_or(false, |range| range.contains(val))
    }

    /// Fill value for pixels without a source pixel. Without
    /// a no-data range, floating point rasters use NaN and
    /// integer rasters use zero.
    pub fn background(&self, view: View, sample_type: SampleType) -> f64 {
        match self.no_data(view) {
            Some(range) => range.representative(),
            None if sample_type.is_floating() => f64::NAN,
            None => 0.,
        }
    }

    /// Convert a packed code to its geophysics value. Missing
    /// codes become the geophysics background.
    pub fn to_geophysics(&self, packed: f64) -> f64 {
        let transfer = match &self.transfer {
            Some(t) => t,
            None => return packed,
        };
        let missing = transfer
            .packed_no_data
            .map_or(false, |range| range.contains(packed));
        if missing {
            return self.background(View::Geophysics, SampleType::Float64);
        }
        packed * transfer.scale + transfer.offset
    }

    /// Convert a geophysics value to its packed code. NaN and
    /// values in the no-data range become the packed
    /// background.
    pub fn to_packed(&self, val: f64) -> f64 {
        let transfer = match &self.transfer {
            Some(t) => t,
            None => return val,
        };
        if self.is_missing(val) {
            return self.background(View::Packed, transfer.packed_type);
        }
        transfer
            .packed_type
            .quantize((val - transfer.offset) / transfer.scale)
    }
}

/// Background value of every band, as seen in `view`.
pub fn background_values(bands: &[SampleDimension], view: View, sample_type: SampleType) -> Vec<f64> {
    bands
        .iter()
        .map(|band| band.background(view, sample_type))
        .collect()
}

pub use crate::error::{CoverageError, EngineError, FailureCause, Result, TransformError};

pub use crate::band::*;
pub use crate::config::{acceleration, EngineConfig};
pub use crate::coverage::*;
pub use crate::crs::*;
#[cfg(feature = "gdal")]
pub use crate::dataset::*;
pub use crate::engine::*;
pub use crate::geometry::*;
pub use crate::grid::*;
pub use crate::interpolation::*;
pub use crate::operation::{names, Context, Operation};
pub use crate::parameters::*;
pub use crate::processor::Processor;
pub use crate::raster::*;
pub use crate::transform::*;

//! Named coverage operations.
//!
//! An [`Operation`] reads a validated [`ParameterGroup`] and
//! produces a new coverage, delegating pixel work to the
//! [`RasterEngine`] held by the [`Context`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::coverage::Coverage;
use crate::crs::CoordinateOperationFactory;
use crate::engine::RasterEngine;
use crate::error::Result;
use crate::parameters::{OperationDescriptor, ParameterGroup};

mod crop;
mod resample;
mod scale;
mod subsample;

pub use crop::{Crop, CROP};
pub use resample::{Resample, RESAMPLE};
pub use scale::{Scale, SCALE};
pub use subsample::{FilteredSubsample, FILTERED_SUBSAMPLE};

/// Parameter names shared by several operations.
pub mod names {
    pub const ENVELOPE: &str = "Envelope";
    pub const INTERPOLATION: &str = "Interpolation";
    pub const BORDER_EXTENDER: &str = "BorderExtender";
    pub const X_SCALE: &str = "xScale";
    pub const Y_SCALE: &str = "yScale";
    pub const X_TRANS: &str = "xTrans";
    pub const Y_TRANS: &str = "yTrans";
    pub const SCALE_X: &str = "scaleX";
    pub const SCALE_Y: &str = "scaleY";
    pub const FILTER: &str = "qsFilterArr";
    pub const CRS: &str = "CoordinateReferenceSystem";
    pub const GRID_GEOMETRY: &str = "GridGeometry";
    pub const INTERPOLATION_TYPE: &str = "InterpolationType";
}

/// Services and defaults available to operations.
#[derive(Clone)]
pub struct Context {
    pub engine: Arc<dyn RasterEngine>,
    pub factory: Arc<dyn CoordinateOperationFactory>,
    pub config: EngineConfig,
}

impl Context {
    pub fn new(engine: Arc<dyn RasterEngine>, factory: Arc<dyn CoordinateOperationFactory>) -> Self {
        Context {
            engine,
            factory,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

/// A coverage operation.
pub trait Operation: Send + Sync {
    fn descriptor(&self) -> &'static OperationDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Run the operation. `Ok(None)` is a defined empty
    /// result (eg. a crop outside the coverage).
    fn execute(&self, params: &ParameterGroup, ctx: &Context) -> Result<Option<Arc<Coverage>>>;
}

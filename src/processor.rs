//! Registry of named operations.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::coverage::Coverage;
use crate::crs::{CoordinateOperationFactory, Crs};
use crate::engine::RasterEngine;
use crate::error::{CoverageError, Result};
use crate::geometry::Envelope;
use crate::grid::GridGeometry;
use crate::interpolation::{BorderExtender, Interpolation};
use crate::operation::{names, Context, Crop, FilteredSubsample, Operation, Resample, Scale};
use crate::parameters::ParameterGroup;

/// Runs operations by name. Names are case-insensitive.
pub struct Processor {
    ctx: Context,
    operations: HashMap<String, Box<dyn Operation>>,
}

impl Processor {
    /// Processor with the Crop, Scale, FilteredSubsample and
    /// Resample operations.
    pub fn new(engine: Arc<dyn RasterEngine>, factory: Arc<dyn CoordinateOperationFactory>) -> Self {
        let mut processor = Processor {
            ctx: Context::new(engine, factory),
            operations: HashMap::new(),
        };
        processor.register(Box::new(Crop));
        processor.register(Box::new(Scale));
        processor.register(Box::new(FilteredSubsample));
        processor.register(Box::new(Resample));
        processor
    }

    /// Use `config` for defaults, and apply its acceleration
    /// setting to the process.
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        config.apply_acceleration();
        self.ctx = self.ctx.with_config(config);
        Ok(self)
    }

    /// Processor configured from the `COVERAGE_*` environment
    /// variables.
    pub fn from_env(
        engine: Arc<dyn RasterEngine>,
        factory: Arc<dyn CoordinateOperationFactory>,
    ) -> Result<Self> {
        Processor::new(engine, factory).with_config(EngineConfig::from_env())
    }

    /// Register `operation`, replacing any operation of the
    /// same name.
    pub fn register(&mut self, operation: Box<dyn Operation>) {
        self.operations
            .insert(operation.name().to_ascii_lowercase(), operation);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Names of the registered operations.
    pub fn operation_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.operations.values().map(|op| op.name()).collect();
        names.sort_unstable();
        names
    }

    fn operation(&self, name: &str) -> Result<&dyn Operation> {
        self.operations
            .get(&name.to_ascii_lowercase())
            .map(|op| op.as_ref())
            .ok_or_else(|| CoverageError::UnknownOperation(name.to_string()))
    }

    /// Fresh parameter group for operation `name`.
    pub fn parameters(&self, name: &str) -> Result<ParameterGroup> {
        Ok(ParameterGroup::new(self.operation(name)?.descriptor()))
    }

    /// Validate `params` and run the operation they are for.
    pub fn execute(&self, params: &ParameterGroup) -> Result<Option<Arc<Coverage>>> {
        let operation = self.operation(params.operation())?;
        params.validate()?;
        debug!(operation = operation.name(), "execute");
        operation.execute(params, &self.ctx)
    }

    /// Crop `source` to `envelope`; `None` if they don't
    /// intersect.
    pub fn crop(&self, source: Arc<Coverage>, envelope: Envelope) -> Result<Option<Arc<Coverage>>> {
        let params = self
            .parameters("Crop")?
            .with_source(source)?
            .with(names::ENVELOPE, envelope)?;
        self.execute(&params)
    }

    pub fn scale(
        &self,
        source: Arc<Coverage>,
        x_scale: f64,
        y_scale: f64,
        x_trans: f64,
        y_trans: f64,
        interpolation: Interpolation,
        border: BorderExtender,
    ) -> Result<Arc<Coverage>> {
        let params = self
            .parameters("Scale")?
            .with_source(source)?
            .with(names::X_SCALE, x_scale)?
            .with(names::Y_SCALE, y_scale)?
            .with(names::X_TRANS, x_trans)?
            .with(names::Y_TRANS, y_trans)?
            .with(names::INTERPOLATION, interpolation)?
            .with(names::BORDER_EXTENDER, border)?;
        self.expect_coverage(&params)
    }

    pub fn filtered_subsample(
        &self,
        source: Arc<Coverage>,
        scale_x: usize,
        scale_y: usize,
        filter: Vec<f64>,
        interpolation: Interpolation,
    ) -> Result<Arc<Coverage>> {
        let params = self
            .parameters("FilteredSubsample")?
            .with_source(source)?
            .with(names::SCALE_X, scale_x as i64)?
            .with(names::SCALE_Y, scale_y as i64)?
            .with(names::FILTER, filter)?
            .with(names::INTERPOLATION, interpolation)?;
        self.expect_coverage(&params)
    }

    /// Reproject `source`; unset arguments are inferred.
    pub fn resample(
        &self,
        source: Arc<Coverage>,
        crs: Option<Crs>,
        grid_geometry: Option<GridGeometry>,
        interpolation: Option<Interpolation>,
    ) -> Result<Arc<Coverage>> {
        let mut params = self.parameters("Resample")?.with_source(source)?;
        if let Some(crs) = crs {
            params.set(names::CRS, crs)?;
        }
        if let Some(gg) = grid_geometry {
            params.set(names::GRID_GEOMETRY, gg)?;
        }
        if let Some(interpolation) = interpolation {
            params.set(names::INTERPOLATION_TYPE, interpolation)?;
        }
        self.expect_coverage(&params)
    }

    fn expect_coverage(&self, params: &ParameterGroup) -> Result<Arc<Coverage>> {
        self.execute(params)?.ok_or_else(|| {
            CoverageError::invalid_coverage(format!("{} produced no coverage", params.operation()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelWindow;
    use crate::testing::{coverage_100, crs_b, recording_context};

    fn processor() -> Processor {
        let (ctx, _) = recording_context();
        Processor::new(ctx.engine, ctx.factory)
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let p = processor();
        assert_eq!(
            p.operation_names(),
            vec!["Crop", "FilteredSubsample", "Resample", "Scale"]
        );
        assert!(p.parameters("crop").is_ok());
        assert!(p.parameters("RESAMPLE").is_ok());
        assert_eq!(
            p.parameters("Histogram").unwrap_err(),
            CoverageError::UnknownOperation("Histogram".into())
        );
    }

    #[test]
    fn test_convenience_methods() {
        let p = processor();
        let source = coverage_100();

        let cropped = p
            .crop(source.clone(), Envelope::new(vec![20., 20.], vec![60., 60.]))
            .unwrap()
            .unwrap();
        assert_eq!(cropped.grid_range().window(), PixelWindow::new(0, 0, 40, 40));

        let scaled = p
            .scale(source.clone(), 2., 2., 0., 0., Interpolation::Nearest, BorderExtender::Copy)
            .unwrap();
        assert_eq!(scaled.grid_range().window(), PixelWindow::new(0, 0, 200, 200));

        let sub = p
            .filtered_subsample(source.clone(), 2, 2, vec![1.], Interpolation::Nearest)
            .unwrap();
        assert_eq!(sub.grid_range().window(), PixelWindow::new(0, 0, 50, 50));

        let in_b = p.resample(source, Some(crs_b()), None, None).unwrap();
        assert!(in_b.crs().unwrap().equals_ignore_metadata(&crs_b()));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            identity_tolerance: f64::NAN,
            ..Default::default()
        };
        let err = processor().with_config(config).err().unwrap();
        assert!(matches!(err, CoverageError::InvalidConfig { ref field, .. } if field == "identity_tolerance"));
    }

    #[test]
    fn test_missing_source() {
        let p = processor();
        let params = p.parameters("Scale").unwrap();
        assert_eq!(
            p.execute(&params).unwrap_err(),
            CoverageError::MissingParameter("Source".into())
        );
    }
}

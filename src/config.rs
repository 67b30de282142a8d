//! Engine configuration and the process-wide acceleration
//! switches.
//!
//! Raster engines may run a primitive through an accelerated
//! ("native") code path. Accelerated affine and scale
//! execution is known to be wrong on floating point samples
//! with non-nearest interpolation, so operations disable it
//! around such calls. The switch is shared by the whole
//! process: toggling and restoring it happens inside a
//! critical section, see [`Acceleration::without_native`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_derive::{Deserialize, Serialize};
use tracing::trace;

use crate::engine::Primitive;
use crate::error::{CoverageError, Result};
use crate::interpolation::{BorderExtender, Interpolation};
use crate::raster::SampleType;

/// Defaults applied by operations when a parameter is not set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interpolation used when a parameter group sets none.
    pub interpolation: Interpolation,

    /// Border extension used by Scale and FilteredSubsample
    /// when a parameter group sets none.
    pub border_extender: BorderExtender,

    /// Whether engines may use accelerated code paths.
    pub native_acceleration: bool,

    /// Largest coefficient deviation for which a composed
    /// transform still counts as the identity.
    pub identity_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Nearest,
            border_extender: BorderExtender::Copy,
            native_acceleration: true,
            identity_tolerance: 1e-9,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("COVERAGE_INTERPOLATION") {
            if let Ok(interp) = val.parse() {
                config.interpolation = interp;
            }
        }

        if let Ok(val) = std::env::var("COVERAGE_BORDER_EXTENDER") {
            if let Ok(border) = val.parse() {
                config.border_extender = border;
            }
        }

        if let Ok(val) = std::env::var("COVERAGE_NATIVE_ACCELERATION") {
            config.native_acceleration = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("COVERAGE_IDENTITY_TOLERANCE") {
            if let Ok(eps) = val.parse() {
                config.identity_tolerance = eps;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.identity_tolerance > 0.) || !self.identity_tolerance.is_finite() {
            return Err(CoverageError::invalid_config(
                "identity_tolerance",
                format!("{} is not a positive number", self.identity_tolerance),
            ));
        }
        Ok(())
    }

    /// Set the process-wide acceleration switch of every
    /// primitive to `native_acceleration`.
    pub fn apply_acceleration(&self) {
        let acc = acceleration();
        for &primitive in Primitive::ALL {
            acc.set_native_enabled(primitive, self.native_acceleration);
        }
    }
}

/// Primitive and sample type combinations whose accelerated
/// path is disabled when interpolating (ie. with anything but
/// nearest-neighbour).
pub const NATIVE_WORKAROUNDS: &[(Primitive, SampleType)] = &[
    (Primitive::Scale, SampleType::Float32),
    (Primitive::Scale, SampleType::Float64),
    (Primitive::Affine, SampleType::Float32),
    (Primitive::Affine, SampleType::Float64),
];

/// True if running `primitive` on `sample_type` with
/// `interpolation` requires disabling acceleration.
pub fn needs_native_workaround(
    primitive: Primitive,
    sample_type: SampleType,
    interpolation: Interpolation,
) -> bool {
    interpolation != Interpolation::Nearest
        && NATIVE_WORKAROUNDS
            .iter()
            .any(|&(p, t)| p == primitive && t == sample_type)
}

#[derive(Debug)]
struct Flag {
    val: AtomicBool,
}

impl Flag {
    const fn new(val: bool) -> Self {
        Flag {
            val: AtomicBool::new(val),
        }
    }

    fn load(&self) -> bool {
        self.val.load(Ordering::Acquire)
    }

    fn store(&self, val: bool) {
        self.val.store(val, Ordering::Release);
    }
}

/// Process-wide acceleration switches, one per primitive.
#[derive(Debug)]
pub struct Acceleration {
    flags: [Flag; Primitive::COUNT],
    section: Mutex<()>,
}

const ENABLED: Flag = Flag::new(true);
static ACCELERATION: Acceleration = Acceleration {
    flags: [ENABLED; Primitive::COUNT],
    section: Mutex::new(()),
};

/// The process-wide acceleration switches.
pub fn acceleration() -> &'static Acceleration {
    &ACCELERATION
}

impl Acceleration {
    pub fn is_native_enabled(&self, primitive: Primitive) -> bool {
        self.flags[primitive.index()].load()
    }

    /// Set the switch of `primitive`. Waits for any running
    /// [`without_native`][Acceleration::without_native]
    /// section to finish.
    pub fn set_native_enabled(&self, primitive: Primitive, enabled: bool) {
        let _section = self.lock();
        self.flags[primitive.index()].store(enabled);
    }

    /// Disable acceleration of `primitive` until the returned
    /// guard is dropped, which restores the previous value.
    /// Only one such section runs at a time.
    pub fn without_native(&self, primitive: Primitive) -> NativeGuard<'_> {
        let section = self.lock();
        let flag = &self.flags[primitive.index()];
        let previous = flag.load();
        flag.store(false);
        trace!(%primitive, previous, "native acceleration disabled");
        NativeGuard {
            flag,
            previous,
            primitive,
            _section: section,
        }
    }

    /// [`without_native`][Acceleration::without_native] if the
    /// combination is listed in [`NATIVE_WORKAROUNDS`].
    pub fn guard_for(
        &self,
        primitive: Primitive,
        sample_type: SampleType,
        interpolation: Interpolation,
    ) -> Option<NativeGuard<'_>> {
        if needs_native_workaround(primitive, sample_type, interpolation) {
            Some(self.without_native(primitive))
        } else {
            None
        }
    }

    /// Hold the switches fixed while the guard lives.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.section
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Restores an acceleration switch when dropped.
pub struct NativeGuard<'a> {
    flag: &'a Flag,
    previous: bool,
    primitive: Primitive,
    _section: MutexGuard<'a, ()>,
}

impl<'a> Drop for NativeGuard<'a> {
    fn drop(&mut self) {
        self.flag.store(self.previous);
        trace!(primitive = %self.primitive, restored = self.previous, "native acceleration restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workaround_table() {
        use Interpolation::*;
        assert!(needs_native_workaround(Primitive::Affine, SampleType::Float32, Bilinear));
        assert!(needs_native_workaround(Primitive::Scale, SampleType::Float64, Bicubic));
        assert!(!needs_native_workaround(Primitive::Affine, SampleType::Float32, Nearest));
        assert!(!needs_native_workaround(Primitive::Affine, SampleType::Int16, Bilinear));
        assert!(!needs_native_workaround(Primitive::Warp, SampleType::Float32, Bilinear));
    }

    #[test]
    fn test_guard_restores_on_every_exit() {
        let acc = acceleration();
        let primitive = Primitive::FilteredSubsample;
        assert!(acc.is_native_enabled(primitive));
        {
            let _guard = acc.without_native(primitive);
            assert!(!acc.is_native_enabled(primitive));
        }
        assert!(acc.is_native_enabled(primitive));

        let result = std::panic::catch_unwind(|| {
            let _guard = acceleration().without_native(primitive);
            panic!("engine failure");
        });
        assert!(result.is_err());
        assert!(acc.is_native_enabled(primitive));
    }

    #[test]
    fn test_config_serde() {
        let config: EngineConfig = serde_json::from_str(r#"{"interpolation": "bilinear"}"#).unwrap();
        assert_eq!(config.interpolation, Interpolation::Bilinear);
        assert_eq!(config.border_extender, BorderExtender::Copy);
        assert!(config.validate().is_ok());

        let bad = EngineConfig {
            identity_tolerance: 0.,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate().unwrap_err(),
            CoverageError::InvalidConfig { ref field, .. } if field == "identity_tolerance"
        ));
    }
}

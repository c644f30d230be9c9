//! Call frame configuration.

use bon::bon;

/// Per-frame settings, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFrameConfig {
    /// Allocate a per-op duration buffer and report timings after each call.
    pub instrumentation: bool,
}

#[bon]
impl CallFrameConfig {
    #[builder]
    pub fn new(#[builder(default)] instrumentation: bool) -> Self {
        Self { instrumentation }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `LOOM_CPU_TRACING` - Enable instrumentation when set to anything but `0`
    pub fn from_env() -> Self {
        let instrumentation = matches!(std::env::var("LOOM_CPU_TRACING").as_deref(), Ok(value) if value != "0");
        Self { instrumentation }
    }
}

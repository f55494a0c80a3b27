//! Player configuration

use chime_core::types::StreamFormat;
use std::time::Duration;

/// Tunable parameters for a player instance
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Interval of the progress task that polls position and emits
    /// `TimeUpdate`/`Progress` events
    pub progress_interval: Duration,

    /// Number of discrete steps in the muted-fallback volume ramp
    pub ramp_steps: u32,

    /// Delay between volume ramp steps
    pub ramp_step_interval: Duration,

    /// Format used by `start_stream` when the caller does not pick one
    pub stream_format: StreamFormat,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(100),
            ramp_steps: 10,
            ramp_step_interval: Duration::from_millis(100),
            stream_format: StreamFormat::speech_mono(),
        }
    }
}

impl PlayerConfig {
    /// Set the progress polling interval
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the volume ramp shape
    #[must_use]
    pub fn with_ramp(mut self, steps: u32, step_interval: Duration) -> Self {
        self.ramp_steps = steps.max(1);
        self.ramp_step_interval = step_interval;
        self
    }

    /// Set the default stream format
    #[must_use]
    pub fn with_stream_format(mut self, format: StreamFormat) -> Self {
        self.stream_format = format;
        self
    }
}

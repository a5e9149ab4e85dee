use std::env;

/// Settings for the demo driver's synthetic engine.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Number of cycles to run before exiting.
    pub cycles: u64,
    /// Delay between cycles (ms).
    pub cycle_interval_ms: u64,
    /// Positions in the generated portfolio.
    pub positions: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            cycles: 20,
            cycle_interval_ms: 250,
            positions: 6,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Values kept per cache entry for history/sparklines.
    pub history_capacity: usize,
    /// Wrap the view in the timing layer.
    pub timing_enabled: bool,
    /// Callback ID clients subscribe to for error notifications.
    pub errors_callback_id: String,
    pub demo: DemoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            timing_enabled: false,
            errors_callback_id: "errors".to_string(),
            demo: DemoConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            history_capacity: env::var("HISTORY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.history_capacity),
            timing_enabled: env::var("ANALYTICS_TIMING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.timing_enabled),
            errors_callback_id: env::var("ERRORS_CALLBACK_ID")
                .unwrap_or(defaults.errors_callback_id),
            demo: DemoConfig {
                cycles: env::var("DEMO_CYCLES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.demo.cycles),
                cycle_interval_ms: env::var("DEMO_CYCLE_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.demo.cycle_interval_ms),
                positions: env::var("DEMO_POSITIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.demo.positions),
            },
        }
    }
}

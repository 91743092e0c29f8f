//! Configuration loading utilities

use crate::MetricsSettings;
use config::{Config, ConfigError, File};

/// Load settings from the default config file location.
///
/// A missing file is not an error; every knob falls back to its default.
pub fn load_settings() -> Result<MetricsSettings, ConfigError> {
	load_settings_from("config/metrics")
}

/// Load settings from a specific config file (extension inferred)
pub fn load_settings_from(path: &str) -> Result<MetricsSettings, ConfigError> {
	let s = Config::builder()
		.add_source(File::with_name(path).required(false))
		.build()?;

	s.try_deserialize()
}

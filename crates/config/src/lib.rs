//! Loadguard Configuration
//!
//! Explicit configuration for the metrics engine. All knobs are resolved
//! once, validated, and handed to the registry at construction time.

pub mod loader;
pub mod settings;

pub use loader::{load_settings, load_settings_from};
pub use settings::{ConfigValidationError, MetricsSettings};

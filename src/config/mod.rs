//! Service configuration.

mod settings;

pub use settings::{ConfigError, Settings};

//! Configuration schema, loading, and validation for the YAML config file.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::load_config;
pub use models::*;
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};

pub mod config;
pub mod error;
pub mod logger;
pub mod registry;
pub mod runner;
pub mod unit;
pub mod utils;

// Re-export commonly used types
pub use error::{HarnessError, Result};
pub use registry::{RegistryBuilder, TestRegistry, UnitFactory};
pub use unit::{RunContext, TestUnit, UnitError};

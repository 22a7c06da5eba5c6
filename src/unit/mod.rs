pub mod command;
pub mod types;

pub use command::{CommandSpec, CommandUnit};
pub use types::{RunContext, TestUnit, UnitError};

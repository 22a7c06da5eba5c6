pub mod formatter;

pub use formatter::{LogFormatter, format_duration};

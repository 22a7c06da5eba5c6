pub mod capture;
pub mod executor;
pub mod orchestrator;
pub mod reporter;
pub mod types;

pub use capture::{CaptureHandle, CaptureSink};
pub use executor::{ExecutorOptions, TestExecutor};
pub use orchestrator::{Orchestrator, Selection};
pub use reporter::{TestReporter, summarize};
pub use types::{RunMode, RunOutcome, RunReport, TestResult, TestSummary};

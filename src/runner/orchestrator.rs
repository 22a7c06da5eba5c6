use crate::error::Result;
use crate::registry::{TestRegistry, UnitFactory};
use crate::runner::executor::TestExecutor;
use crate::runner::reporter::TestReporter;
use crate::runner::types::{RunMode, RunReport, TestResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};

/// 要运行哪些测试
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Single(String),
}

impl FromStr for Selection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s == "all" {
            Selection::All
        } else {
            Selection::Single(s.to_string())
        })
    }
}

/// Drives the executor over the registry, one test at a time.
pub struct Orchestrator<'a> {
    registry: &'a TestRegistry,
    executor: TestExecutor,
    reporter: TestReporter,
    log_dir: PathBuf,
    continue_on_failure: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a TestRegistry,
        executor: TestExecutor,
        reporter: TestReporter,
        log_dir: impl Into<PathBuf>,
        continue_on_failure: bool,
    ) -> Self {
        Self {
            registry,
            executor,
            reporter,
            log_dir: log_dir.into(),
            continue_on_failure,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// 日志路径: `<log_dir>/<name>.log`
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", name))
    }

    /// Resolve a selection against the registry without running anything.
    pub fn plan(&self, selection: &Selection) -> Result<Vec<(&'a str, &'a UnitFactory)>> {
        let registry: &'a TestRegistry = self.registry;
        match selection {
            Selection::All => Ok(registry.entries().collect()),
            Selection::Single(name) => {
                registry.resolve(name)?;
                Ok(registry
                    .entries()
                    .filter(|(n, _)| *n == name.as_str())
                    .collect())
            }
        }
    }

    /// Run the selection. Unknown names and an unusable log directory are
    /// reported before any test starts.
    pub async fn run(&self, selection: &Selection) -> Result<RunReport> {
        let planned = self.plan(selection)?;
        fs::create_dir_all(&self.log_dir)?;

        let overall_start = Instant::now();

        let (mode, results, not_run) = if planned.len() == 1 {
            let (name, factory) = planned[0];
            self.reporter.print_single_start(name);
            let result = self.execute_one(name, factory).await;
            self.reporter.print_single_result(&result);
            (RunMode::Single, vec![result], Vec::new())
        } else {
            let (results, not_run) = self.run_many(&planned).await;
            (RunMode::Multi, results, not_run)
        };

        Ok(RunReport {
            mode,
            results,
            not_run,
            overall_duration: overall_start.elapsed(),
        })
    }

    async fn run_many(&self, planned: &[(&str, &UnitFactory)]) -> (Vec<TestResult>, Vec<String>) {
        self.reporter.print_start(planned.len());

        let mut results = Vec::with_capacity(planned.len());

        for (name, factory) in planned {
            self.reporter.print_running(name);

            let result = self.execute_one(name, factory).await;
            self.reporter.print_result(&result);

            let stop = !result.success && !self.continue_on_failure;
            results.push(result);

            if stop {
                self.reporter.print_halt();
                break;
            }
        }

        // 按顺序执行，结果之后的条目都未运行
        let not_run = planned[results.len()..]
            .iter()
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();

        if !not_run.is_empty() {
            info!("{} test(s) left pending after early stop", not_run.len());
        }

        (results, not_run)
    }

    async fn execute_one(&self, name: &str, factory: &UnitFactory) -> TestResult {
        let log_path = self.log_path(name);
        let result = self.executor.execute(name, factory, &log_path).await;
        debug!(
            "{} finished: success={} duration={:?}",
            name, result.success, result.duration
        );
        result
    }
}

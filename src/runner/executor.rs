use crate::registry::UnitFactory;
use crate::runner::capture::{CaptureHandle, CaptureSink};
use crate::runner::types::{RunOutcome, TestResult};
use crate::unit::{RunContext, UnitError};
use crate::utils::LogFormatter;
use chrono::Local;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, error, warn};

/// How the unit's blocking thread ended.
enum Finished {
    Returned(Result<(), UnitError>),
    Panicked {
        message: String,
        trace: Option<String>,
    },
}

/// 执行器选项
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// 失败时把诊断信息写入日志
    pub verbose: bool,

    /// 日志文件写缓冲大小（字节）
    pub log_buffer: usize,

    /// 单个测试的超时时间；None 表示不限时
    pub timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            log_buffer: 1024,
            timeout: None,
        }
    }
}

/// Runs one test unit in isolation and turns however it ended into a
/// [`TestResult`].
///
/// No fault escapes `execute`: unit errors, panics, timeouts and log I/O
/// failures all come back as a failed result.
pub struct TestExecutor {
    options: ExecutorOptions,
}

impl TestExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// 执行单个测试
    pub async fn execute(&self, name: &str, factory: &UnitFactory, log_path: &Path) -> TestResult {
        debug!("Executing {} -> {}", name, log_path.display());

        if let Err(e) = fs::write(log_path, LogFormatter::header(name, Local::now())) {
            error!("Cannot initialize log for {}: {}", name, e);
            return TestResult::failed(
                name.to_string(),
                format!("Failed to initialize log file {}: {}", log_path.display(), e),
                Duration::ZERO,
                log_path.to_path_buf(),
            );
        }

        // 开始计时
        let start = Instant::now();

        let (outcome, trace, output) = match CaptureSink::open(log_path, self.options.log_buffer) {
            Ok(sink) => {
                self.run_captured(name, factory, CaptureHandle::new(sink), log_path)
                    .await
            }
            Err(e) => (
                RunOutcome::FailedWithFault(format!(
                    "Failed to open log file {}: {}",
                    log_path.display(),
                    e
                )),
                None,
                String::new(),
            ),
        };

        let duration = start.elapsed();

        match self.finalize_log(log_path, &outcome, trace.as_deref(), duration) {
            Ok(()) => TestResult::from_outcome(
                name.to_string(),
                &outcome,
                duration,
                log_path.to_path_buf(),
                output,
            ),
            Err(e) => {
                error!("Cannot finalize log for {}: {}", name, e);
                TestResult {
                    output,
                    ..TestResult::failed(
                        name.to_string(),
                        format!("Failed to write log file {}: {}", log_path.display(), e),
                        duration,
                        log_path.to_path_buf(),
                    )
                }
            }
        }
    }

    /// Construct and run the unit on a blocking thread with output bound to
    /// `handle`. The sink is closed before this returns, on every path.
    ///
    /// A log write error recorded by the sink fails the run even if the unit
    /// ignored it.
    async fn run_captured(
        &self,
        name: &str,
        factory: &UnitFactory,
        handle: CaptureHandle,
        log_path: &Path,
    ) -> (RunOutcome, Option<String>, String) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let factory = Arc::clone(factory);
        let mut ctx = RunContext::new(name.to_string(), handle.clone(), Arc::clone(&cancelled));
        let verbose = self.options.verbose;

        let task = tokio::task::spawn_blocking(move || {
            let caught = catch_with_trace(verbose, || {
                let mut unit = factory();
                unit.run(&mut ctx)
            });
            // 写入失败已记录在 sink 中
            let _ = ctx.flush();

            match caught {
                Ok(result) => Finished::Returned(result),
                Err((payload, trace)) => Finished::Panicked {
                    message: panic_message(payload.as_ref()),
                    trace,
                },
            }
        });

        let joined = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => Some(joined),
                Err(_) => None,
            },
            None => Some(task.await),
        };

        let (outcome, trace) = match joined {
            Some(Ok(Finished::Returned(Ok(())))) => (RunOutcome::Success, None),
            Some(Ok(Finished::Returned(Err(e)))) => self.normalize_unit_error(name, e),
            Some(Ok(Finished::Panicked { message, trace })) => (
                RunOutcome::FailedWithFault(format!(
                    "Error running test {}: panicked: {}",
                    name, message
                )),
                trace,
            ),
            Some(Err(e)) => (normalize_join_error(name, e), None),
            None => {
                let limit = self.options.timeout.unwrap_or_default();
                warn!("{} exceeded its timeout of {:?}", name, limit);
                // The blocking thread cannot be aborted: flag it and cut off its output.
                cancelled.store(true, Ordering::SeqCst);
                (RunOutcome::TimedOut(limit), None)
            }
        };

        if let Err(e) = handle.close() {
            warn!("Failed to close capture sink for {}: {}", name, e);
        }

        let outcome = match (outcome, handle.failure()) {
            (RunOutcome::Success, Some(err)) => {
                error!("Log write failed for {}: {}", name, err);
                RunOutcome::FailedWithFault(format!(
                    "Failed to write log file {}: {}",
                    log_path.display(),
                    err
                ))
            }
            (outcome, _) => outcome,
        };

        (outcome, trace, handle.captured())
    }

    fn normalize_unit_error(&self, name: &str, err: UnitError) -> (RunOutcome, Option<String>) {
        match err {
            UnitError::Exit(0) => (RunOutcome::Success, None),
            UnitError::Exit(code) => (RunOutcome::FailedWithExitCode(code), None),
            other => {
                let trace = self.options.verbose.then(|| format!("{:?}", other));
                (
                    RunOutcome::FailedWithFault(format!("Error running test {}: {}", name, other)),
                    trace,
                )
            }
        }
    }

    /// Append the failure block and the trailer directly to the log file.
    fn finalize_log(
        &self,
        log_path: &Path,
        outcome: &RunOutcome,
        trace: Option<&str>,
        duration: Duration,
    ) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(log_path)?;

        if let Some(message) = outcome.message() {
            file.write_all(LogFormatter::failure(&message, trace).as_bytes())?;
        }

        file.write_all(LogFormatter::trailer(outcome.is_success(), duration).as_bytes())?;
        file.flush()
    }
}

impl Default for TestExecutor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

thread_local! {
    static TRACE_PANICS: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static TRACE_HOOK: Once = Once::new();

/// Chain a panic hook that records a backtrace on threads that opted in.
fn install_trace_hook() {
    TRACE_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if TRACE_PANICS.with(Cell::get) {
                let trace = format!("{}\n\nstack backtrace:\n{}", info, Backtrace::force_capture());
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

/// Run `f`, catching a panic. With `verbose` the panic's location and
/// backtrace come back alongside the payload.
fn catch_with_trace<T>(
    verbose: bool,
    f: impl FnOnce() -> T,
) -> Result<T, (Box<dyn Any + Send>, Option<String>)> {
    if verbose {
        install_trace_hook();
    }

    // blocking 线程会被复用，每次都重置
    TRACE_PANICS.with(|flag| flag.set(verbose));
    PANIC_TRACE.with(|slot| slot.borrow_mut().take());

    let caught = panic::catch_unwind(AssertUnwindSafe(f));
    TRACE_PANICS.with(|flag| flag.set(false));

    caught.map_err(|payload| (payload, PANIC_TRACE.with(|slot| slot.borrow_mut().take())))
}

fn normalize_join_error(name: &str, err: JoinError) -> RunOutcome {
    if err.is_panic() {
        let payload = err.into_panic();
        RunOutcome::FailedWithFault(format!(
            "Error running test {}: panicked: {}",
            name,
            panic_message(payload.as_ref())
        ))
    } else {
        RunOutcome::FailedWithFault(format!("Error running test {}: task aborted", name))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

use std::path::PathBuf;
use std::time::Duration;

/// 单个测试运行的归一化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    FailedWithFault(String),
    FailedWithExitCode(i32),
    TimedOut(Duration),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// 失败时展示给用户的消息；成功时为 None
    pub fn message(&self) -> Option<String> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::FailedWithFault(msg) => Some(msg.clone()),
            RunOutcome::FailedWithExitCode(code) => Some(format!("Test exited with code: {}", code)),
            RunOutcome::TimedOut(limit) => Some(format!(
                "Test timed out after {:.2}s",
                limit.as_secs_f64()
            )),
        }
    }
}

/// 单个测试的执行结果
#[derive(Debug, Clone)]
pub struct TestResult {
    /// 测试名称（注册表键）
    pub name: String,

    /// 是否成功
    pub success: bool,

    /// 执行耗时（构造测试单元之前到结果归一化之后）
    pub duration: Duration,

    /// 错误消息（如果失败）
    pub error: Option<String>,

    /// 日志文件路径
    pub log_path: PathBuf,

    /// 运行期间捕获的输出
    pub output: String,
}

impl TestResult {
    pub fn from_outcome(
        name: String,
        outcome: &RunOutcome,
        duration: Duration,
        log_path: PathBuf,
        output: String,
    ) -> Self {
        Self {
            name,
            success: outcome.is_success(),
            duration,
            error: outcome.message(),
            log_path,
            output,
        }
    }

    pub fn failed(name: String, error: String, duration: Duration, log_path: PathBuf) -> Self {
        Self {
            name,
            success: false,
            duration,
            error: Some(error),
            log_path,
            output: String::new(),
        }
    }
}

/// 运行模式，由请求的测试数量决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single,
    Multi,
}

/// 一次编排运行的输出
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,

    /// 执行顺序的结果
    pub results: Vec<TestResult>,

    /// 因提前停止而未执行的测试
    pub not_run: Vec<String>,

    /// 整体耗时（包含编排开销）
    pub overall_duration: Duration,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// 测试摘要
#[derive(Debug, Clone)]
pub struct TestSummary<'a> {
    pub total: usize,
    pub passed: Vec<&'a TestResult>,
    pub failed: Vec<&'a TestResult>,
    pub overall_duration: Duration,
}

impl<'a> TestSummary<'a> {
    pub fn from_results(results: &'a [TestResult], overall_duration: Duration) -> Self {
        let (passed, failed): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.success);

        Self {
            total: results.len(),
            passed,
            failed,
            overall_duration,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

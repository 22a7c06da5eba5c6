use crate::runner::capture::CaptureHandle;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// 测试单元失败的方式
///
/// `Exit(0)` 视为成功，与正常返回等价。
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("exit code {0}")]
    Exit(i32),

    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UnitError {
    pub fn failed(msg: impl Into<String>) -> Self {
        UnitError::Failed(msg.into())
    }
}

/// 一个可执行的测试单元
///
/// `run` 的所有输出都必须写入 `ctx`，不得写入进程级 stdout/stderr。
pub trait TestUnit: Send {
    fn run(&mut self, ctx: &mut RunContext) -> Result<(), UnitError>;
}

impl<F> TestUnit for F
where
    F: FnMut(&mut RunContext) -> Result<(), UnitError> + Send,
{
    fn run(&mut self, ctx: &mut RunContext) -> Result<(), UnitError> {
        self(ctx)
    }
}

/// 单次运行的上下文：输出通道 + 取消标志
pub struct RunContext {
    name: String,
    output: CaptureHandle,
    cancelled: Arc<AtomicBool>,
}

impl RunContext {
    pub(crate) fn new(name: String, output: CaptureHandle, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            name,
            output,
            cancelled,
        }
    }

    /// 当前测试名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 执行器是否已放弃本次运行（例如超时）
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Write for RunContext {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

use crate::unit::types::{RunContext, TestUnit, UnitError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

// How often the output loop checks for cancellation while the child is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `[[tests]]` 配置项：以外部进程运行的测试
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    /// 测试名称（注册表键）
    pub name: String,

    /// 可执行程序
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// 额外环境变量
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// 工作目录
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// 用于展示的命令行
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs an external program and streams its stdout/stderr into the run's sink.
///
/// Exit status 0 is success, any other code becomes [`UnitError::Exit`].
/// The child is killed if the executor cancels the run or the sink stops
/// accepting writes.
pub struct CommandUnit {
    spec: CommandSpec,
}

impl CommandUnit {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    fn spawn(&self) -> Result<Child, UnitError> {
        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &self.spec.cwd {
            command.current_dir(cwd);
        }

        command.spawn().map_err(|e| {
            UnitError::failed(format!(
                "failed to spawn `{}`: {}",
                self.spec.command_line(),
                e
            ))
        })
    }

    /// Forward output chunks until both pipes close.
    fn pump(&self, child: &mut Child, ctx: &mut RunContext) -> Result<(), UnitError> {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx.clone());
        }
        drop(tx);

        loop {
            if ctx.is_cancelled() {
                return Err(UnitError::failed("run cancelled"));
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => ctx.write_all(&chunk)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}

impl TestUnit for CommandUnit {
    fn run(&mut self, ctx: &mut RunContext) -> Result<(), UnitError> {
        debug!("Spawning `{}` for {}", self.spec.command_line(), ctx.name());
        let mut child = self.spawn()?;

        let status = self
            .pump(&mut child, ctx)
            .and_then(|()| wait_or_cancel(&mut child, ctx));

        match status {
            Ok(status) => exit_status_to_result(status),
            Err(e) => {
                // 不留下孤儿进程
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }
}

/// Wait for the child to exit, giving up once the run is cancelled.
///
/// The pipes may already be closed while the process keeps running, so the
/// exit is polled rather than waited on.
fn wait_or_cancel(child: &mut Child, ctx: &RunContext) -> Result<ExitStatus, UnitError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if ctx.is_cancelled() {
            return Err(UnitError::failed("run cancelled"));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: mpsc::Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn exit_status_to_result(status: ExitStatus) -> Result<(), UnitError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(UnitError::Exit(code)),
        None => Err(UnitError::failed(signal_message(status))),
    }
}

#[cfg(unix)]
fn signal_message(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("process terminated by signal {}", signal),
        None => format!("process terminated abnormally: {}", status),
    }
}

#[cfg(not(unix))]
fn signal_message(status: ExitStatus) -> String {
    format!("process terminated abnormally: {}", status)
}

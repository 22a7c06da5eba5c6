use chrono::{DateTime, Local};
use std::time::Duration;

/// 日志与控制台共用的分隔线宽度
pub const LOG_SEPARATOR_WIDTH: usize = 50;

/// 控制台摘要分隔线宽度
pub const CONSOLE_SEPARATOR_WIDTH: usize = 60;

/// 以两位小数的秒数展示耗时，例如 `1.25s`
pub fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// 测试日志文件的头尾格式
pub struct LogFormatter;

impl LogFormatter {
    pub fn separator() -> String {
        "=".repeat(LOG_SEPARATOR_WIDTH)
    }

    /// `Starting <name> test at <YYYY-MM-DD HH:MM:SS>` + 分隔线
    pub fn header(name: &str, started_at: DateTime<Local>) -> String {
        format!(
            "Starting {} test at {}\n{}\n",
            name,
            started_at.format("%Y-%m-%d %H:%M:%S"),
            Self::separator()
        )
    }

    /// 失败消息块；verbose 时附带诊断信息
    pub fn failure(message: &str, trace: Option<&str>) -> String {
        let mut block = format!("\n{}\n", message);
        if let Some(trace) = trace {
            block.push_str(trace);
            if !trace.ends_with('\n') {
                block.push('\n');
            }
        }
        block
    }

    pub fn trailer(success: bool, duration: Duration) -> String {
        format!(
            "\n{}\nTest completed: {}\nDuration: {}\n",
            Self::separator(),
            if success { "SUCCESS" } else { "FAILED" },
            format_duration(duration)
        )
    }
}

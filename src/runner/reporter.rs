use crate::runner::types::{RunReport, TestResult, TestSummary};
use crate::utils::format_duration;
use crate::utils::formatter::CONSOLE_SEPARATOR_WIDTH;
use colored::Colorize;
use std::fmt::Write as _;
use std::time::Duration;

// 失败时在控制台展示的捕获输出行数（verbose）
const OUTPUT_TAIL_LINES: usize = 10;

pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印多测试运行开始
    pub fn print_start(&self, total: usize) {
        println!("\nRunning {} tests...", total);
        println!("{}", "=".repeat(CONSOLE_SEPARATOR_WIDTH));
    }

    pub fn print_running(&self, name: &str) {
        println!(" {} Running test: {}", "▶".cyan(), name.bold());
    }

    /// 打印单个测试结果（测试结束后立即调用）
    pub fn print_result(&self, result: &TestResult) {
        if result.success {
            println!(
                " {} {} PASSED in {}",
                "✓".green(),
                result.name,
                format_duration(result.duration)
            );
        } else {
            println!(
                " {} {} FAILED in {}",
                "✗".red(),
                result.name,
                format_duration(result.duration)
            );
            if let Some(error) = &result.error {
                println!("   {}: {}", "Error".red().bold(), error);
            }
            if self.verbose {
                self.print_output_tail(result);
            }
        }

        println!("   Log: {}", result.log_path.display());
        println!();
    }

    /// 因失败提前停止
    pub fn print_halt(&self) {
        println!(
            " {} Stopping test execution due to failure",
            "⚠".yellow()
        );
        println!();
    }

    pub fn print_single_start(&self, name: &str) {
        println!("\nRunning single test: {}", name.bold());
    }

    /// 单测试模式的结果输出
    pub fn print_single_result(&self, result: &TestResult) {
        if result.success {
            println!(
                " {} {} PASSED in {}",
                "✓".green(),
                result.name,
                format_duration(result.duration)
            );
            println!("Test completed successfully!");
        } else {
            println!(
                " {} {} FAILED in {}",
                "✗".red(),
                result.name,
                format_duration(result.duration)
            );
            if self.verbose {
                if let Some(error) = &result.error {
                    println!("{}: {}", "Error".red().bold(), error);
                }
                self.print_output_tail(result);
            }
        }

        println!("Full log: {}", result.log_path.display());
    }

    /// 打印多测试运行的摘要
    pub fn print_summary(&self, report: &RunReport) -> bool {
        let (text, all_passed) = summarize(&report.results, report.overall_duration, self.verbose);
        print!("{}", text);

        if !report.not_run.is_empty() {
            println!(
                "{}: {} ({})",
                "Not run".dimmed(),
                report.not_run.len(),
                report.not_run.join(", ")
            );
            println!();
        }

        all_passed
    }

    fn print_output_tail(&self, result: &TestResult) {
        let lines: Vec<&str> = result.output.lines().collect();
        if lines.is_empty() {
            return;
        }

        let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
        println!("   Last output:");
        for line in &lines[skip..] {
            println!("     {}", line.dimmed());
        }
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

/// 渲染测试摘要
///
/// 返回 (报告文本, 是否全部通过)。全部通过当且仅当没有失败的结果。
pub fn summarize(results: &[TestResult], overall_duration: Duration, verbose: bool) -> (String, bool) {
    let summary = TestSummary::from_results(results, overall_duration);
    let separator = "=".repeat(CONSOLE_SEPARATOR_WIDTH);
    let mut out = String::new();

    // String 写入不会失败
    let _ = writeln!(out, "{}", separator);
    let _ = writeln!(out, "{}", "TEST SUMMARY".bold());
    let _ = writeln!(out, "{}", separator);

    let _ = writeln!(out, "Total tests: {}", summary.total);
    let _ = writeln!(out, "Passed: {}", summary.passed.len().to_string().green());
    let _ = writeln!(out, "Failed: {}", summary.failed.len().to_string().red());
    let _ = writeln!(out, "Overall time: {}", format_duration(summary.overall_duration));
    let _ = writeln!(out);

    if !summary.passed.is_empty() {
        let _ = writeln!(out, "{} PASSED TESTS:", "✓".green());
        for result in &summary.passed {
            let _ = writeln!(
                out,
                "  • {:<15} ({})",
                result.name,
                format_duration(result.duration)
            );
        }
        let _ = writeln!(out);
    }

    if !summary.failed.is_empty() {
        let _ = writeln!(out, "{} FAILED TESTS:", "✗".red());
        for result in &summary.failed {
            let _ = writeln!(
                out,
                "  • {:<15} ({})",
                result.name,
                format_duration(result.duration)
            );
            if let Some(error) = &result.error {
                let _ = writeln!(out, "    └─ {}", error);
            }
        }
        let _ = writeln!(out);

        if verbose {
            let _ = writeln!(out, "For detailed error information, check the log files:");
            for result in &summary.failed {
                let _ = writeln!(out, "  • {}: {}", result.name, result.log_path.display());
            }
            let _ = writeln!(out);
        }
    }

    let all_passed = summary.all_passed();
    if all_passed {
        let _ = writeln!(out, "{}", "All tests PASSED!".green().bold());
    } else {
        let _ = writeln!(
            out,
            "{}",
            format!("{} test(s) FAILED", summary.failed.len()).red().bold()
        );
    }

    (out, all_passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::types::RunOutcome;
    use std::path::PathBuf;

    fn result(name: &str, outcome: RunOutcome, millis: u64) -> TestResult {
        TestResult::from_outcome(
            name.to_string(),
            &outcome,
            Duration::from_millis(millis),
            PathBuf::from(format!("/logs/{}.log", name)),
            String::new(),
        )
    }

    #[test]
    fn test_summarize_all_passed() {
        colored::control::set_override(false);
        let results = vec![
            result("ping", RunOutcome::Success, 1250),
            result("uptime", RunOutcome::Success, 500),
        ];

        let (text, all_passed) = summarize(&results, Duration::from_secs(2), false);
        assert!(all_passed);
        assert!(text.contains("Total tests: 2"));
        assert!(text.contains("Passed: 2"));
        assert!(text.contains("Failed: 0"));
        assert!(text.contains("Overall time: 2.00s"));
        assert!(text.contains("ping            (1.25s)"));
        assert!(!text.contains("FAILED TESTS"));
        assert!(text.contains("All tests PASSED!"));
    }

    #[test]
    fn test_summarize_with_failures() {
        colored::control::set_override(false);
        let results = vec![
            result("a", RunOutcome::Success, 100),
            result("b", RunOutcome::FailedWithFault("Error running test b: boom".into()), 200),
            result("c", RunOutcome::FailedWithExitCode(2), 300),
        ];

        let (text, all_passed) = summarize(&results, Duration::from_secs(1), false);
        assert!(!all_passed);
        assert!(text.contains("Passed: 1"));
        assert!(text.contains("Failed: 2"));
        assert!(text.contains("└─ Error running test b: boom"));
        assert!(text.contains("└─ Test exited with code: 2"));
        assert!(text.contains("2 test(s) FAILED"));
        // 非 verbose 模式不列出日志路径
        assert!(!text.contains("/logs/b.log"));

        // 失败列表保持原始顺序
        let b = text.find("  • b").unwrap();
        let c = text.find("  • c").unwrap();
        assert!(b < c);
    }

    #[test]
    fn test_summarize_verbose_lists_failed_logs() {
        colored::control::set_override(false);
        let results = vec![
            result("a", RunOutcome::Success, 100),
            result("b", RunOutcome::TimedOut(Duration::from_secs(5)), 5000),
        ];

        let (text, all_passed) = summarize(&results, Duration::from_secs(6), true);
        assert!(!all_passed);
        assert!(text.contains("check the log files"));
        assert!(text.contains("  • b: /logs/b.log"));
        assert!(!text.contains("/logs/a.log"));
    }

    #[test]
    fn test_summarize_empty_run() {
        colored::control::set_override(false);
        let (text, all_passed) = summarize(&[], Duration::ZERO, false);
        assert!(all_passed);
        assert!(text.contains("Total tests: 0"));
    }
}

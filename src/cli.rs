use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use functest::config::{self, ConfigLoader, HarnessConfig};
use functest::registry::TestRegistry;
use functest::runner::{
    ExecutorOptions, Orchestrator, RunMode, Selection, TestExecutor, TestReporter,
};
use functest::utils::format_duration;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser, Debug)]
#[command(name = "functest", author, version, about = "Run functional tests with per-test logs", long_about = None)]
pub struct Cli {
    /// Test to run, or "all"
    #[arg(short, long, default_value = "all")]
    pub test: String,

    /// Log file write buffer size in bytes
    #[arg(short = 'b', long)]
    pub log_buffer: Option<usize>,

    /// Show error detail, captured output and log paths on failure
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop running tests after the first failure
    #[arg(long)]
    pub stop_on_failure: bool,

    /// List available tests and exit
    #[arg(long)]
    pub list_tests: bool,

    /// Path to functest.toml (searched for when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for per-test log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Per-test timeout in seconds (at least 1)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn executor_options(&self, config: &HarnessConfig) -> ExecutorOptions {
        ExecutorOptions {
            verbose: self.verbose,
            log_buffer: self.log_buffer.unwrap_or(config.log_buffer),
            timeout: self.timeout.map(Duration::from_secs).or_else(|| config.timeout()),
        }
    }

    fn continue_on_failure(&self, config: &HarnessConfig) -> bool {
        !self.stop_on_failure && config.continue_on_failure
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let config = match &cli.config {
        Some(path) => Some(ConfigLoader::load_from_path(path)?),
        None => ConfigLoader::find_and_load()?,
    };

    config.context("no functest.toml found; pass one with --config")
}

fn list_tests(config: &HarnessConfig, registry: &TestRegistry) {
    let mut specs: Vec<_> = config.tests.iter().collect();
    specs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Test", "Command"]);
    for spec in specs {
        table.add_row(vec![Cell::new(&spec.name), Cell::new(spec.command_line())]);
    }

    println!("Available tests:");
    println!("{}", table);
    println!("\nTotal: {} tests", registry.len());
}

/// 运行 CLI，返回是否全部通过
pub async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(&cli)?;
    let registry = config.build_registry()?;

    if cli.list_tests {
        list_tests(&config, &registry);
        return Ok(true);
    }

    let selection: Selection = cli.test.parse()?;
    // 未知测试在任何执行之前失败
    if let Selection::Single(name) = &selection {
        registry.resolve(name)?;
    }

    let log_dir = config::log_dir_from_env(cli.log_dir.as_deref(), &config)?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;
    println!("Using log directory: {}", log_dir.display());

    let start = Instant::now();
    let orchestrator = Orchestrator::new(
        &registry,
        TestExecutor::new(cli.executor_options(&config)),
        TestReporter::new(cli.verbose),
        log_dir,
        cli.continue_on_failure(&config),
    );

    let report = orchestrator.run(&selection).await?;
    let all_passed = match report.mode {
        RunMode::Single => report.all_passed(),
        RunMode::Multi => TestReporter::new(cli.verbose).print_summary(&report),
    };

    if all_passed {
        println!("Total runtime: {}", format_duration(start.elapsed()));
    }

    Ok(all_passed)
}

#![cfg(unix)]

use functest::config::{self, ConfigLoader};
use functest::runner::{Orchestrator, RunMode, Selection, TestExecutor, TestReporter, summarize};
use std::fs;
use tempfile::TempDir;

/// 从配置文件构建注册表并运行整个套件
#[tokio::test]
async fn test_config_driven_suite() {
    colored::control::set_override(false);

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("functest.toml");
    fs::create_dir(temp_dir.path().join("scripts")).unwrap();
    fs::write(temp_dir.path().join("scripts").join("data.txt"), "fixture\n").unwrap();

    fs::write(
        &config_path,
        r#"
log_dir = "logs"
log_buffer = 256
continue_on_failure = true

[[tests]]
name = "getblockcount"
command = "sh"
args = ["-c", "cat data.txt"]
cwd = "scripts"

[[tests]]
name = "getblock"
command = "sh"
args = ["-c", "echo 'block not found' >&2; exit 2"]

[[tests]]
name = "uptime"
command = "sh"
args = ["-c", "echo up"]
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_path(&config_path).unwrap();
    let registry = config.build_registry().unwrap();
    let log_dir = config::resolve_log_dir(None, &config, None).unwrap();
    assert_eq!(log_dir, temp_dir.path().join("logs"));

    let orchestrator = Orchestrator::new(
        &registry,
        TestExecutor::default(),
        TestReporter::new(true),
        &log_dir,
        config.continue_on_failure,
    );
    let report = orchestrator.run(&Selection::All).await.unwrap();

    assert_eq!(report.mode, RunMode::Multi);
    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].success, "{:?}", report.results[0].error);
    assert!(report.results[0].output.contains("fixture"));
    assert!(!report.results[1].success);
    assert_eq!(
        report.results[1].error.as_deref(),
        Some("Test exited with code: 2")
    );
    assert!(report.results[2].success);

    let failed_log = fs::read_to_string(log_dir.join("getblock.log")).unwrap();
    assert!(failed_log.starts_with("Starting getblock test at "));
    assert!(failed_log.contains("block not found"));
    assert!(failed_log.contains("Test completed: FAILED"));

    let (text, all_passed) = summarize(&report.results, report.overall_duration, true);
    assert!(!all_passed);
    assert!(text.contains("Total tests: 3"));
    assert!(text.contains("Passed: 2"));
    assert!(text.contains("Failed: 1"));
    assert!(text.contains(&log_dir.join("getblock.log").display().to_string()));
}

#[tokio::test]
async fn test_config_without_log_dir_needs_environment() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("functest.toml");
    fs::write(
        &config_path,
        r#"
[[tests]]
name = "ping"
command = "true"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_path(&config_path).unwrap();
    assert!(config::resolve_log_dir(None, &config, None).is_err());

    let from_env = config::resolve_log_dir(None, &config, Some(temp_dir.path().into())).unwrap();
    assert_eq!(from_env, temp_dir.path().join("logs"));
}

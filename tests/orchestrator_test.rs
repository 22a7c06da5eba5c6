use functest::runner::{
    ExecutorOptions, Orchestrator, RunMode, Selection, TestExecutor, TestReporter, summarize,
};
use functest::{HarnessError, RunContext, TestRegistry, TestUnit, UnitError};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// 记录运行次数的测试单元
struct Counted {
    runs: Arc<AtomicUsize>,
    fail_with: Option<&'static str>,
}

impl TestUnit for Counted {
    fn run(&mut self, ctx: &mut RunContext) -> Result<(), UnitError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        writeln!(ctx, "running")?;
        match self.fail_with {
            Some(msg) => Err(UnitError::failed(msg)),
            None => Ok(()),
        }
    }
}

struct Suite {
    registry: TestRegistry,
    runs: Vec<Arc<AtomicUsize>>,
}

/// A: 成功, B: 抛出 "boom", C: 成功
fn abc_suite() -> Suite {
    let mut builder = TestRegistry::builder();
    let mut runs = Vec::new();

    for (name, fail_with) in [("A", None), ("B", Some("boom")), ("C", None)] {
        let counter = Arc::new(AtomicUsize::new(0));
        runs.push(Arc::clone(&counter));
        builder = builder
            .register(name, move || Counted {
                runs: Arc::clone(&counter),
                fail_with,
            })
            .unwrap();
    }

    Suite {
        registry: builder.build(),
        runs,
    }
}

fn orchestrator<'a>(
    registry: &'a TestRegistry,
    log_dir: &Path,
    continue_on_failure: bool,
) -> Orchestrator<'a> {
    Orchestrator::new(
        registry,
        TestExecutor::new(ExecutorOptions::default()),
        TestReporter::new(false),
        log_dir,
        continue_on_failure,
    )
}

#[tokio::test]
async fn test_continue_on_failure_runs_everything() {
    let suite = abc_suite();
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");

    let report = orchestrator(&suite.registry, &log_dir, true)
        .run(&Selection::All)
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Multi);
    let outcomes: Vec<(&str, bool)> = report
        .results
        .iter()
        .map(|r| (r.name.as_str(), r.success))
        .collect();
    assert_eq!(outcomes, vec![("A", true), ("B", false), ("C", true)]);
    assert!(report.results[1].error.as_deref().unwrap().contains("boom"));
    assert!(report.not_run.is_empty());
    assert!(!report.all_passed());

    for name in ["A", "B", "C"] {
        assert!(log_dir.join(format!("{}.log", name)).exists());
    }
    for counter in &suite.runs {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    let (_, all_passed) = summarize(&report.results, report.overall_duration, false);
    assert!(!all_passed);
}

#[tokio::test]
async fn test_stop_on_failure_leaves_rest_pending() {
    let suite = abc_suite();
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");

    let report = orchestrator(&suite.registry, &log_dir, false)
        .run(&Selection::All)
        .await
        .unwrap();

    let outcomes: Vec<(&str, bool)> = report
        .results
        .iter()
        .map(|r| (r.name.as_str(), r.success))
        .collect();
    assert_eq!(outcomes, vec![("A", true), ("B", false)]);
    assert_eq!(report.not_run, vec!["C".to_string()]);
    assert!(!report.all_passed());

    assert!(log_dir.join("A.log").exists());
    assert!(log_dir.join("B.log").exists());
    assert!(!log_dir.join("C.log").exists());
    assert_eq!(suite.runs[2].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_test_fails_before_execution() {
    let suite = abc_suite();
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");

    let result = orchestrator(&suite.registry, &log_dir, true)
        .run(&Selection::Single("D".to_string()))
        .await;

    match result {
        Err(HarnessError::UnknownTest(name)) => assert_eq!(name, "D"),
        other => panic!("Expected UnknownTest, got {:?}", other.map(|r| r.results.len())),
    }
    assert!(!log_dir.exists());
    for counter in &suite.runs {
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_single_mode_propagates_result() {
    let suite = abc_suite();
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let orchestrator = orchestrator(&suite.registry, &log_dir, true);

    let failed = orchestrator
        .run(&Selection::Single("B".to_string()))
        .await
        .unwrap();
    assert_eq!(failed.mode, RunMode::Single);
    assert_eq!(failed.results.len(), 1);
    assert!(!failed.all_passed());

    let passed = orchestrator
        .run(&Selection::Single("C".to_string()))
        .await
        .unwrap();
    assert!(passed.all_passed());

    // 只创建了被请求测试的日志
    assert!(!log_dir.join("A.log").exists());
    assert!(log_dir.join("B.log").exists());
    assert!(log_dir.join("C.log").exists());
}

#[tokio::test]
async fn test_all_with_one_entry_uses_single_mode() {
    let registry = TestRegistry::builder()
        .register("only", || Counted {
            runs: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
        })
        .unwrap()
        .build();
    let dir = TempDir::new().unwrap();

    let report = orchestrator(&registry, dir.path(), true)
        .run(&Selection::All)
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Single);
    assert!(report.all_passed());
}

#[tokio::test]
async fn test_empty_registry_passes_vacuously() {
    let registry = TestRegistry::builder().build();
    let dir = TempDir::new().unwrap();

    let report = orchestrator(&registry, dir.path(), true)
        .run(&Selection::All)
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Multi);
    assert!(report.results.is_empty());
    assert!(report.all_passed());
}

#[tokio::test]
async fn test_rerun_is_stable() {
    let suite = abc_suite();
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&suite.registry, dir.path(), true);

    let first = orchestrator.run(&Selection::All).await.unwrap();
    let second = orchestrator.run(&Selection::All).await.unwrap();

    let flags = |report: &functest::runner::RunReport| -> Vec<bool> {
        report.results.iter().map(|r| r.success).collect()
    };
    assert_eq!(flags(&first), flags(&second));
    assert!(report_overall_covers_tests(&first));
}

fn report_overall_covers_tests(report: &functest::runner::RunReport) -> bool {
    let sum: std::time::Duration = report.results.iter().map(|r| r.duration).sum();
    report.overall_duration >= sum
}

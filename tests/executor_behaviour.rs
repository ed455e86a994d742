use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use watchflow::config::CommandSpec;
use watchflow::exec::{
    AttemptOutcome, CommandExecutor, ExecutionResult, ExecutorOptions, FailureKind,
    GroupControl, GroupObserver, Outcome, SkipPolicy,
};
use watchflow::fs::mock::MockFileSystem;
use watchflow::template::EventContext;
use watchflow::types::ExecutionMode;
use watchflow_test_utils::builders::CommandBuilder;
use watchflow_test_utils::fake_backend::{exited, exited_with_stderr, FakeBackend};
use watchflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn executor(backend: &FakeBackend, max_parallel: usize) -> CommandExecutor {
    CommandExecutor::with_parts(
        "/proj",
        ExecutorOptions {
            max_parallel,
            validate_commands: false,
            skip_policy: SkipPolicy::disabled(),
        },
        Arc::new(MockFileSystem::new()),
        Arc::new(backend.clone()),
    )
}

fn ctx() -> EventContext {
    EventContext::new("modified", vec!["/proj/src/main.py".to_string()], "py")
}

fn names(results: &[ExecutionResult]) -> Vec<&str> {
    results.iter().map(|r| r.command_name.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn flaky_command_runs_retries_plus_one_attempts() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always_exit("flaky", 1);
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("flaky", &["false"]).retries(2).build();

    let start = tokio::time::Instant::now();
    let result = exec.execute(&spec, &ctx()).await;

    assert_eq!(result.outcome, Outcome::Failure);
    assert_eq!(result.failure, Some(FailureKind::NonZeroExit));
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.attempts, 3);
    assert_eq!(backend.attempts_of("flaky"), 3);
    // Two fixed back-offs of one second each.
    assert!(start.elapsed() >= Duration::from_secs(2));

    let attempts: Vec<u32> = backend.invocations().iter().map(|i| i.attempt).collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn success_after_retry_stops_retrying() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().script("lint", [exited(2), exited(0)]);
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("lint", &["lint"]).retries(5).build();

    let result = exec.execute(&spec, &ctx()).await;

    assert!(result.is_success());
    assert_eq!(result.attempts, 2);
    assert_eq!(backend.attempts_of("lint"), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_waits_one_two_four_seconds() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always_exit("build", 1);
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("build", &["make"])
        .retries(3)
        .exponential()
        .build();

    let start = tokio::time::Instant::now();
    let result = exec.execute(&spec, &ctx()).await;
    let elapsed = start.elapsed();

    assert_eq!(result.attempts, 4);
    assert!(elapsed >= Duration::from_secs(7), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "elapsed {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn timeout_is_terminal_and_not_retried() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always("slow", AttemptOutcome::TimedOut);
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("slow", &["sleep", "60"])
        .timeout_secs(2)
        .retries(3)
        .build();

    let result = exec.execute(&spec, &ctx()).await;

    assert_eq!(result.failure, Some(FailureKind::TimedOut));
    assert_eq!(result.attempts, 1);
    assert_eq!(backend.attempts_of("slow"), 1);
    assert_eq!(result.stderr, "command timed out after 2s");
    assert_eq!(result.exit_code, None);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_reported_as_failure() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always(
        "broken",
        AttemptOutcome::SpawnFailed("permission denied".to_string()),
    );
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("broken", &["./broken.sh"]).build();

    let result = exec.execute(&spec, &ctx()).await;

    assert_eq!(result.failure, Some(FailureKind::SpawnFailed));
    assert_eq!(result.error_excerpt().as_deref(), Some("permission denied"));
    Ok(())
}

#[tokio::test]
async fn templates_are_rendered_before_spawning() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("fmt", &["black", "{{path}}", "--tag={{watcher}}", "{{nope}}"])
        .build();

    let result = exec.execute(&spec, &ctx()).await;
    assert!(result.is_success());

    let inv = &backend.invocations()[0];
    assert_eq!(
        inv.argv,
        vec!["black", "/proj/src/main.py", "--tag=py", "{{nope}}"]
    );
    assert_eq!(inv.working_dir, std::path::PathBuf::from("/proj"));
    Ok(())
}

#[tokio::test]
async fn working_dir_is_resolved_against_project_root() -> TestResult {
    let backend = FakeBackend::new();
    let exec = executor(&backend, 4);
    let spec = CommandBuilder::new("fmt", &["fmt"]).working_dir("web").build();

    exec.execute(&spec, &ctx()).await;

    assert_eq!(
        backend.invocations()[0].working_dir,
        std::path::PathBuf::from("/proj/web")
    );
    Ok(())
}

#[tokio::test]
async fn sequential_group_returns_one_result_per_spec_in_order() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always_exit("b", 1);
    let exec = executor(&backend, 4);
    let specs: Vec<CommandSpec> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|n| CommandBuilder::new(n, &[n]).build())
        .collect();

    let results = exec
        .execute_group(&specs, &ctx(), ExecutionMode::Sequential)
        .await;

    assert_eq!(names(&results), vec!["a", "b", "c", "d"]);
    assert!(results[1].is_failure());
    assert_eq!(backend.started_order(), vec!["a", "b", "c", "d"]);
    Ok(())
}

#[derive(Default)]
struct HaltOnFailure {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

impl GroupObserver for HaltOnFailure {
    fn command_started(&self, spec: &CommandSpec) {
        self.started.lock().unwrap().push(spec.name.clone());
    }

    fn command_finished(&self, result: &ExecutionResult) -> GroupControl {
        self.finished.lock().unwrap().push(result.command_name.clone());
        if result.is_failure() {
            GroupControl::Halt
        } else {
            GroupControl::Continue
        }
    }
}

#[tokio::test]
async fn sequential_group_halts_when_observer_asks() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().always_exit("lint", 1);
    let exec = executor(&backend, 4);
    let specs = vec![
        CommandBuilder::new("fmt", &["fmt"]).build(),
        CommandBuilder::new("lint", &["lint"]).build(),
        CommandBuilder::new("test", &["pytest"]).build(),
    ];
    let observer = Arc::new(HaltOnFailure::default());

    let results = exec
        .execute_group_observed(&specs, &ctx(), ExecutionMode::Sequential, observer.clone())
        .await;

    assert_eq!(names(&results), vec!["fmt", "lint"]);
    assert_eq!(backend.attempts_of("test"), 0);
    assert_eq!(*observer.started.lock().unwrap(), vec!["fmt", "lint"]);
    assert_eq!(*observer.finished.lock().unwrap(), vec!["fmt", "lint"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn parallel_group_reports_in_declared_order_and_runs_everything() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new()
        .with_delay(Duration::from_millis(50))
        .always_exit("second", 3);
    let exec = executor(&backend, 8);
    let specs: Vec<CommandSpec> = ["first", "second", "third"]
        .into_iter()
        .map(|n| CommandBuilder::new(n, &[n]).build())
        .collect();
    let observer = Arc::new(HaltOnFailure::default());

    let results = exec
        .execute_group_observed(&specs, &ctx(), ExecutionMode::Parallel, observer.clone())
        .await;

    assert_eq!(names(&results), vec!["first", "second", "third"]);
    assert!(results[1].is_failure());
    // Halt has no effect once everything was launched.
    assert_eq!(backend.attempts_of("third"), 1);
    assert_eq!(
        *observer.finished.lock().unwrap(),
        vec!["first", "second", "third"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_max_parallel() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_delay(Duration::from_millis(100));
    let exec = executor(&backend, 2);
    let specs: Vec<CommandSpec> = (0..6)
        .map(|i| {
            let name = format!("job{i}");
            CommandBuilder::new(&name, &["job"]).build()
        })
        .collect();

    let results = exec
        .execute_group(&specs, &ctx(), ExecutionMode::Parallel)
        .await;

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(backend.peak_concurrency(), 2);
    assert_eq!(exec.max_parallel(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cap_is_shared_across_groups() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_delay(Duration::from_millis(100));
    let exec = executor(&backend, 3);
    let group_a: Vec<CommandSpec> = (0..4)
        .map(|i| CommandBuilder::new(&format!("a{i}"), &["a"]).build())
        .collect();
    let group_b: Vec<CommandSpec> = (0..4)
        .map(|i| CommandBuilder::new(&format!("b{i}"), &["b"]).build())
        .collect();

    let ctx = ctx();
    let (ra, rb) = tokio::join!(
        exec.execute_group(&group_a, &ctx, ExecutionMode::Parallel),
        exec.execute_group(&group_b, &ctx, ExecutionMode::Parallel),
    );

    assert_eq!(ra.len() + rb.len(), 8);
    assert!(backend.peak_concurrency() <= 3);
    Ok(())
}

#[tokio::test]
async fn error_excerpt_uses_first_stderr_line_truncated() -> TestResult {
    let long = "x".repeat(150);
    let backend = FakeBackend::new().always(
        "check",
        exited_with_stderr(1, &format!("{long}\nsecond line\n")),
    );
    let exec = executor(&backend, 1);
    let spec = CommandBuilder::new("check", &["check"]).build();

    let result = exec.execute(&spec, &ctx()).await;
    let excerpt = result.error_excerpt().unwrap();

    assert_eq!(excerpt.chars().count(), 100);
    assert!(excerpt.ends_with("..."));
    assert_eq!(&excerpt[..97], &long[..97]);
    Ok(())
}

use std::error::Error;
use std::sync::Arc;

use watchflow::exec::skip::{NO_MATCHING_CHANGES_REASON, NO_TESTS_REASON};
use watchflow::exec::{CommandExecutor, ExecutorOptions, FailureKind, SkipPolicy};
use watchflow::fs::mock::MockFileSystem;
use watchflow::template::EventContext;
use watchflow_test_utils::builders::CommandBuilder;
use watchflow_test_utils::fake_backend::FakeBackend;
use watchflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn executor(
    fs: &MockFileSystem,
    backend: &FakeBackend,
    skip_policy: SkipPolicy,
    validate_commands: bool,
) -> CommandExecutor {
    CommandExecutor::with_parts(
        "/proj",
        ExecutorOptions {
            max_parallel: 2,
            validate_commands,
            skip_policy,
        },
        Arc::new(fs.clone()),
        Arc::new(backend.clone()),
    )
}

fn ctx_for(path: &str) -> EventContext {
    EventContext::new("modified", vec![path.to_string()], "py")
}

#[tokio::test]
async fn skip_until_exists_waits_for_the_file() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::disabled(), false);
    let spec = CommandBuilder::new("deploy", &["deploy"])
        .skip_until_exists("out.txt")
        .build();

    let skipped = exec.execute(&spec, &ctx_for("/proj/a.py")).await;
    assert!(skipped.is_skipped());
    assert!(skipped.skip_reason.as_deref().unwrap().contains("out.txt"));
    assert_eq!(skipped.attempts, 0);
    assert_eq!(backend.attempts_of("deploy"), 0);

    fs.add_file("/proj/out.txt", "built");
    let ran = exec.execute(&spec, &ctx_for("/proj/a.py")).await;
    assert!(ran.is_success());
    assert_eq!(backend.attempts_of("deploy"), 1);
    Ok(())
}

#[tokio::test]
async fn test_named_commands_skip_without_tests() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/app.py", "print()");
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::default(), false);
    let spec = CommandBuilder::new("Unit-Tests", &["pytest"]).build();

    let result = exec.execute(&spec, &ctx_for("/proj/src/app.py")).await;
    assert!(result.is_skipped());
    assert_eq!(result.skip_reason.as_deref(), Some(NO_TESTS_REASON));

    // Heuristic is evaluated fresh every time.
    fs.add_file("/proj/src/pkg/app_test.py", "def test(): pass");
    let result = exec.execute(&spec, &ctx_for("/proj/src/app.py")).await;
    assert!(result.is_success());
    Ok(())
}

#[tokio::test]
async fn conventional_test_dir_counts_as_tests() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/__tests__");
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::default(), false);
    let spec = CommandBuilder::new("test", &["jest"]).build();

    let result = exec.execute(&spec, &ctx_for("/proj/index.js")).await;
    assert!(result.is_success());
    Ok(())
}

#[tokio::test]
async fn custom_and_disabled_skip_policies() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/checks");
    let backend = FakeBackend::new();
    let spec = CommandBuilder::new("test", &["run-checks"]).build();

    let custom = SkipPolicy {
        test_dirs: vec!["checks".to_string()],
        test_file_patterns: Vec::new(),
        ..SkipPolicy::default()
    };
    let exec = executor(&fs, &backend, custom, false);
    assert!(exec.execute(&spec, &ctx_for("/proj/x")).await.is_success());

    let empty = MockFileSystem::new();
    let exec = executor(&empty, &backend, SkipPolicy::disabled(), false);
    assert!(exec.execute(&spec, &ctx_for("/proj/x")).await.is_success());
    Ok(())
}

#[tokio::test]
async fn only_if_changed_filters_on_changed_paths() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::disabled(), false);
    let spec = CommandBuilder::new("migrate", &["migrate"])
        .only_if_changed("migrations/*.sql")
        .only_if_changed("schema.prisma")
        .build();

    let result = exec.execute(&spec, &ctx_for("/proj/src/app.py")).await;
    assert_eq!(result.skip_reason.as_deref(), Some(NO_MATCHING_CHANGES_REASON));

    let result = exec
        .execute(&spec, &ctx_for("/proj/migrations/001_init.sql"))
        .await;
    assert!(result.is_success());

    let result = exec.execute(&spec, &ctx_for("/proj/db/schema.prisma")).await;
    assert!(result.is_success());
    Ok(())
}

#[tokio::test]
async fn skip_until_exists_is_checked_before_test_heuristic() -> TestResult {
    let fs = MockFileSystem::new();
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::default(), false);
    let spec = CommandBuilder::new("e2e-test", &["e2e"])
        .skip_until_exists("dist/app")
        .build();

    let result = exec.execute(&spec, &ctx_for("/proj/a")).await;
    assert_eq!(result.skip_reason.as_deref(), Some("waiting for dist/app"));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn missing_program_fails_without_spawning() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::disabled(), true);
    let spec = CommandBuilder::new("fmt", &["definitely-not-a-real-binary-xyz", "{{path}}"])
        .retries(3)
        .build();

    let result = exec.execute(&spec, &ctx_for("/proj/a.py")).await;

    assert_eq!(result.failure, Some(FailureKind::CommandNotFound));
    assert_eq!(result.attempts, 0);
    assert!(result.stderr.contains("definitely-not-a-real-binary-xyz"));
    assert!(backend.invocations().is_empty());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn relative_program_paths_resolve_against_working_dir() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/web/scripts/build.sh", "#!/bin/sh");
    let backend = FakeBackend::new();
    let exec = executor(&fs, &backend, SkipPolicy::disabled(), true);

    let ok = CommandBuilder::new("build", &["./scripts/build.sh"])
        .working_dir("web")
        .build();
    assert!(exec.execute(&ok, &ctx_for("/proj/a")).await.is_success());

    let missing = CommandBuilder::new("build", &["./scripts/build.sh"]).build();
    let result = exec.execute(&missing, &ctx_for("/proj/a")).await;
    assert_eq!(result.failure, Some(FailureKind::CommandNotFound));
    assert_eq!(result.stderr, "command path not found: ./scripts/build.sh");
    Ok(())
}

#[test]
fn test_file_search_skips_vendored_and_hidden_dirs() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/app.py", "print()");
    fs.add_file("/proj/node_modules/lib/index.test.js", "x");
    fs.add_file("/proj/.git/hooks/test_hook.py", "x");
    fs.add_file("/proj/target/debug/build_test.go", "x");
    let policy = SkipPolicy::default();

    assert!(!policy.has_tests(&fs, std::path::Path::new("/proj")));

    fs.add_file("/proj/src/widgets/button.test.js", "x");
    assert!(policy.has_tests(&fs, std::path::Path::new("/proj")));
}

#[cfg(unix)]
#[test]
fn test_file_search_does_not_follow_symlinked_dirs() -> TestResult {
    use watchflow::fs::RealFileSystem;

    let outside = tempfile::tempdir()?;
    std::fs::write(outside.path().join("test_elsewhere.py"), "x")?;
    let proj = tempfile::tempdir()?;
    std::os::unix::fs::symlink(outside.path(), proj.path().join("linked"))?;

    assert!(!SkipPolicy::default().has_tests(&RealFileSystem, proj.path()));
    Ok(())
}

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use watchflow::errors::WatchflowError;
use watchflow::fs::mock::MockFileSystem;
use watchflow::fs::RealFileSystem;
use watchflow::watch::{ChangeDetector, ChangeKind, ChangeNotification, GroupEventHandler};
use watchflow_test_utils::builders::{CommandBuilder, GroupBuilder};
use watchflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const MODIFY: EventKind = EventKind::Modify(ModifyKind::Data(DataChange::Content));

fn event(kind: EventKind, path: &str) -> Event {
    Event::new(kind).add_path(path.into())
}

fn py_group(debounce_ms: u64) -> GroupBuilder {
    GroupBuilder::new("py")
        .path("src")
        .pattern("*.py")
        .ignore("__pycache__")
        .debounce_ms(debounce_ms)
        .command(CommandBuilder::new("fmt", &["black", "{{path}}"]))
}

fn handler(
    fs: &MockFileSystem,
    debounce_ms: u64,
) -> (GroupEventHandler, mpsc::Receiver<ChangeNotification>, Arc<AtomicBool>) {
    let (tx, rx) = mpsc::channel(16);
    let active = Arc::new(AtomicBool::new(true));
    let handler = GroupEventHandler::new(
        &py_group(debounce_ms).build(),
        Arc::new(fs.clone()),
        Arc::clone(&active),
        tx,
    )
    .expect("valid patterns");
    (handler, rx, active)
}

#[test]
fn identical_content_is_deduplicated_by_hash() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.py", "print('a')");
    let (mut h, _rx, _) = handler(&fs, 100);
    let t0 = Instant::now();

    let first = h.process(&event(MODIFY, "/proj/src/main.py"), t0);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].kind, ChangeKind::Modified);
    assert_eq!(first[0].paths, vec!["/proj/src/main.py".to_string()]);
    assert_eq!(first[0].group, "py");

    // Same bytes, outside the debounce window.
    let second = h.process(&event(MODIFY, "/proj/src/main.py"), t0 + Duration::from_millis(500));
    assert!(second.is_empty());

    fs.add_file("/proj/src/main.py", "print('b')");
    let third = h.process(&event(MODIFY, "/proj/src/main.py"), t0 + Duration::from_millis(1000));
    assert_eq!(third.len(), 1);
    Ok(())
}

#[test]
fn events_inside_debounce_window_collapse() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.py", "v1");
    let (mut h, _rx, _) = handler(&fs, 100);
    let t0 = Instant::now();

    assert_eq!(h.process(&event(MODIFY, "/proj/src/main.py"), t0).len(), 1);
    fs.add_file("/proj/src/main.py", "v2");
    assert!(
        h.process(&event(MODIFY, "/proj/src/main.py"), t0 + Duration::from_millis(40))
            .is_empty()
    );
    // The window slides from the last accepted event, not the dropped one.
    fs.add_file("/proj/src/main.py", "v3");
    assert_eq!(
        h.process(&event(MODIFY, "/proj/src/main.py"), t0 + Duration::from_millis(120))
            .len(),
        1
    );
    Ok(())
}

#[test]
fn debounce_is_tracked_per_path() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/a.py", "a");
    fs.add_file("/proj/src/b.py", "b");
    let (mut h, _rx, _) = handler(&fs, 100);
    let t0 = Instant::now();

    assert_eq!(h.process(&event(MODIFY, "/proj/src/a.py"), t0).len(), 1);
    assert_eq!(
        h.process(&event(MODIFY, "/proj/src/b.py"), t0 + Duration::from_millis(10))
            .len(),
        1
    );
    assert_eq!(h.cache().len(), 2);
    Ok(())
}

#[test]
fn patterns_and_ignores_filter_paths() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/readme.md", "# hi");
    fs.add_file("/proj/src/__pycache__/main.py", "bytecode");
    let (mut h, _rx, _) = handler(&fs, 0);
    let now = Instant::now();

    assert!(h.process(&event(MODIFY, "/proj/src/readme.md"), now).is_empty());
    assert!(
        h.process(&event(MODIFY, "/proj/src/__pycache__/main.py"), now)
            .is_empty()
    );
    assert!(h.cache().is_empty());
    Ok(())
}

#[test]
fn directory_and_access_events_are_ignored() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/src/pkg.py");
    fs.add_file("/proj/src/main.py", "x");
    let (mut h, _rx, _) = handler(&fs, 0);
    let now = Instant::now();

    assert!(h.process(&event(MODIFY, "/proj/src/pkg.py"), now).is_empty());
    assert!(
        h.process(&event(EventKind::Create(CreateKind::Folder), "/proj/src/new.py"), now)
            .is_empty()
    );
    assert!(
        h.process(&event(EventKind::Access(AccessKind::Any), "/proj/src/main.py"), now)
            .is_empty()
    );
    Ok(())
}

#[test]
fn unreadable_files_are_treated_as_changed() -> TestResult {
    let fs = MockFileSystem::new();
    let (mut h, _rx, _) = handler(&fs, 0);
    let now = Instant::now();

    assert_eq!(h.process(&event(MODIFY, "/proj/src/gone.py"), now).len(), 1);
    assert_eq!(h.process(&event(MODIFY, "/proj/src/gone.py"), now).len(), 1);
    Ok(())
}

#[test]
fn created_refreshes_and_deleted_forgets_the_hash() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.py", "same");
    let (mut h, _rx, _) = handler(&fs, 0);
    let now = Instant::now();
    let path = Path::new("/proj/src/main.py");

    let created = h.process(&event(EventKind::Create(CreateKind::File), "/proj/src/main.py"), now);
    assert_eq!(created[0].kind, ChangeKind::Created);
    assert!(h.cache().get(path).and_then(|f| f.hash.as_ref()).is_some());

    // Created already recorded these bytes.
    assert!(h.process(&event(MODIFY, "/proj/src/main.py"), now).is_empty());

    let deleted = h.process(&event(EventKind::Remove(RemoveKind::File), "/proj/src/main.py"), now);
    assert_eq!(deleted[0].kind, ChangeKind::Deleted);
    assert!(h.cache().get(path).and_then(|f| f.hash.as_ref()).is_none());

    // After a delete the same bytes count as a change again.
    assert_eq!(h.process(&event(MODIFY, "/proj/src/main.py"), now).len(), 1);
    Ok(())
}

#[test]
fn renames_are_reported_as_moved() -> TestResult {
    let fs = MockFileSystem::new();
    let (mut h, _rx, _) = handler(&fs, 0);

    let moved = h.process(
        &event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            "/proj/src/renamed.py",
        ),
        Instant::now(),
    );
    assert_eq!(moved[0].kind, ChangeKind::Moved);
    Ok(())
}

#[test]
fn handle_forwards_only_while_active() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.py", "one");
    let (mut h, mut rx, active) = handler(&fs, 0);

    active.store(false, Ordering::Release);
    h.handle(Ok(event(MODIFY, "/proj/src/main.py")));
    assert!(rx.try_recv().is_err());

    active.store(true, Ordering::Release);
    h.handle(Ok(event(MODIFY, "/proj/src/main.py")));
    let got = rx.try_recv()?;
    assert_eq!(got.group, "py");
    assert_eq!(got.kind, ChangeKind::Modified);
    Ok(())
}

#[test]
fn full_channel_drops_after_handoff_timeout() -> TestResult {
    let fs = MockFileSystem::new();
    let (tx, mut rx) = mpsc::channel(1);
    let active = Arc::new(AtomicBool::new(true));
    let mut h = GroupEventHandler::new(&py_group(0).build(), Arc::new(fs.clone()), active, tx)?;

    h.handle(Ok(event(MODIFY, "/proj/src/a.py")));
    let start = Instant::now();
    h.handle(Ok(event(MODIFY, "/proj/src/b.py")));
    assert!(start.elapsed() >= Duration::from_millis(200));

    assert_eq!(rx.try_recv()?.paths, vec!["/proj/src/a.py".to_string()]);
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn register_fails_when_no_path_exists() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let mut detector = ChangeDetector::new(dir.path(), Arc::new(RealFileSystem));
    let (tx, _rx) = mpsc::channel(16);

    let group = GroupBuilder::new("ghost")
        .path("missing")
        .path("also-missing")
        .command(CommandBuilder::new("noop", &["true"]))
        .build();

    match detector.register(&group, tx) {
        Err(WatchflowError::WatchPath { group, .. }) => assert_eq!(group, "ghost"),
        other => panic!("expected WatchPath error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn register_skips_missing_paths_but_keeps_the_rest() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir(dir.path().join("src"))?;
    let mut detector = ChangeDetector::new(dir.path(), Arc::new(RealFileSystem));
    let (tx, _rx) = mpsc::channel(16);

    let group = GroupBuilder::new("py")
        .path("src")
        .path("missing")
        .command(CommandBuilder::new("noop", &["true"]))
        .build();

    assert_eq!(detector.register(&group, tx)?, 1);
    assert_eq!(detector.watched_paths("py").map(|p| p.len()), Some(1));

    detector.stop(Duration::from_secs(2)).await;
    detector.stop(Duration::from_secs(2)).await;
    assert!(!detector.is_active());
    Ok(())
}

#[tokio::test]
async fn real_file_writes_reach_the_channel() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir(dir.path().join("src"))?;
    let mut detector = ChangeDetector::new(dir.path(), Arc::new(RealFileSystem));
    let (tx, mut rx) = mpsc::channel(16);
    detector.register(&py_group(100).build(), tx)?;
    detector.start();

    // Give the native backend a moment to arm its watches.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(dir.path().join("src").join("main.py"), "print('hi')")?;
    fs::write(dir.path().join("src").join("notes.txt"), "ignored")?;

    let got = timeout(Duration::from_secs(5), rx.recv())
        .await?
        .expect("channel open");
    assert_eq!(got.group, "py");
    assert!(got.paths[0].ends_with("main.py"), "{:?}", got.paths);

    detector.stop(Duration::from_secs(2)).await;
    Ok(())
}

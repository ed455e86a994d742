use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use watchflow::exec::{AttemptOutcome, Invocation, ProcessBackend};

/// A fake process backend that:
/// - records every invocation it receives
/// - answers with scripted outcomes per command name (exit 0 by default)
/// - optionally sleeps per attempt and tracks peak concurrency.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    scripts: Mutex<HashMap<String, VecDeque<AttemptOutcome>>>,
    fallback: Mutex<HashMap<String, AttemptOutcome>>,
    invocations: Mutex<Vec<Invocation>>,
    delay: Mutex<Option<Duration>>,
    delays: Mutex<HashMap<String, Duration>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt of `command` exits with `code`.
    pub fn always_exit(self, command: &str, code: i32) -> Self {
        self.always(command, exited(code))
    }

    pub fn always(self, command: &str, outcome: AttemptOutcome) -> Self {
        self.inner
            .fallback
            .lock()
            .unwrap()
            .insert(command.to_string(), outcome);
        self
    }

    /// Queue outcomes for the next attempts of `command`; once exhausted the
    /// fallback (or exit 0) applies.
    pub fn script(self, command: &str, outcomes: impl IntoIterator<Item = AttemptOutcome>) -> Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Make each attempt take `delay` (tokio time).
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Make each attempt of `command` take `delay`, overriding
    /// [`with_delay`](Self::with_delay).
    pub fn delay_for(self, command: &str, delay: Duration) -> Self {
        self.inner
            .delays
            .lock()
            .unwrap()
            .insert(command.to_string(), delay);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.invocations.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, command: &str) -> usize {
        self.inner
            .invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.command == command)
            .count()
    }

    /// Command names in the order their first attempt started.
    pub fn started_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for inv in self.inner.invocations.lock().unwrap().iter() {
            if !seen.contains(&inv.command) {
                seen.push(inv.command.clone());
            }
        }
        seen
    }

    /// Highest number of attempts that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, command: &str) -> AttemptOutcome {
        if let Some(outcome) = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
        {
            return outcome;
        }
        self.inner
            .fallback
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| exited(0))
    }
}

impl ProcessBackend for FakeBackend {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>> {
        Box::pin(async move {
            self.inner
                .invocations
                .lock()
                .unwrap()
                .push(invocation.clone());

            let now = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .inner
                .delays
                .lock()
                .unwrap()
                .get(&invocation.command)
                .copied()
                .or(*self.inner.delay.lock().unwrap());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            self.inner.running.fetch_sub(1, Ordering::SeqCst);
            self.next_outcome(&invocation.command)
        })
    }
}

/// An `Exited` outcome with empty output.
pub fn exited(code: i32) -> AttemptOutcome {
    AttemptOutcome::Exited {
        code,
        stdout: String::new(),
        stderr: String::new(),
    }
}

/// An `Exited` outcome with the given stderr.
pub fn exited_with_stderr(code: i32, stderr: &str) -> AttemptOutcome {
    AttemptOutcome::Exited {
        code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

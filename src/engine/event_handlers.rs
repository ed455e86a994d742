// src/engine/event_handlers.rs

//! Running one watch group for one trigger and reporting what happened.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::config::{CommandSpec, WatchGroup};
use crate::exec::{ExecutionResult, GroupControl, GroupObserver};
use crate::template::EventContext;
use crate::types::EngineState;

use super::runtime::{ActiveConfig, Engine};
use super::{Notification, NotificationSink};

/// Reports per-command progress to the sink and applies fail-fast.
struct GroupReporter {
    engine: Engine,
    sink: Arc<dyn NotificationSink>,
    fail_fast: bool,
    tripped: AtomicBool,
}

impl GroupObserver for GroupReporter {
    fn command_started(&self, spec: &CommandSpec) {
        self.sink.notify(Notification::CommandStarted {
            name: spec.name.clone(),
        });
    }

    fn command_finished(&self, result: &ExecutionResult) -> GroupControl {
        self.sink.notify(Notification::for_result(result));

        if !(self.fail_fast && result.is_failure()) {
            return GroupControl::Continue;
        }
        // Only the first failure of a trigger stops the engine.
        if !self.tripped.swap(true, Ordering::AcqRel)
            && self.engine.state() == EngineState::Running
        {
            info!(command = %result.command_name, "fail-fast triggered");
            self.sink.notify(Notification::FailFastTriggered {
                command: result.command_name.clone(),
            });
            self.engine.request_stop();
        }
        GroupControl::Halt
    }
}

/// Execute `group` for the trigger described by `ctx` using the
/// configuration that was active when the trigger arrived.
pub(crate) async fn run_group(
    engine: Engine,
    active: Arc<ActiveConfig>,
    group: WatchGroup,
    ctx: EventContext,
) {
    let sink = Arc::clone(&engine.inner.sink);
    let reporter = Arc::new(GroupReporter {
        engine,
        sink: Arc::clone(&sink),
        fail_fast: active.config.global.fail_fast,
        tripped: AtomicBool::new(false),
    });

    debug!(group = %group.name, mode = ?group.mode, path = %ctx.path, "running group");
    let results = active
        .executor
        .execute_group_observed(&group.commands, &ctx, group.mode, reporter)
        .await;

    sink.notify(Notification::GroupCompleted {
        group: group.name,
        results,
    });
}

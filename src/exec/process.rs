// src/exec/process.rs

//! Real process runner built on `tokio::process`.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AttemptOutcome, Invocation, ProcessBackend};

/// Spawns each attempt as an OS process with piped stdout/stderr.
///
/// - argv is executed directly (no shell) except on Windows, where it is
///   passed through `cmd /C` so built-ins resolve.
/// - The timeout spans both the wait and the output collection. On expiry
///   the child is killed and reaped and the output readers are aborted.
#[derive(Debug, Clone, Default)]
pub struct RealProcessBackend;

impl ProcessBackend for RealProcessBackend {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>> {
        Box::pin(run_attempt(invocation))
    }
}

fn build_command(argv: &[String]) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").args(argv);
        c
    } else {
        let mut c = Command::new(&argv[0]);
        c.args(&argv[1..]);
        c
    }
}

async fn run_attempt(inv: &Invocation) -> AttemptOutcome {
    if inv.argv.is_empty() {
        return AttemptOutcome::SpawnFailed("empty command".to_string());
    }

    debug!(
        command = %inv.command,
        attempt = inv.attempt,
        argv = ?inv.argv,
        cwd = ?inv.working_dir,
        "starting command process"
    );

    let mut cmd = build_command(&inv.argv);
    cmd.current_dir(&inv.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(command = %inv.command, error = %err, "failed to spawn process");
            return AttemptOutcome::SpawnFailed(format!(
                "failed to start '{}': {err}",
                inv.argv[0]
            ));
        }
    };

    let mut stdout = child.stdout.take().map(spawn_reader);
    let mut stderr = child.stderr.take().map(spawn_reader);

    // The deadline covers output collection too: a backgrounded grandchild
    // can keep the pipes open long after the direct child exited.
    let finished = async {
        let status = child.wait().await;
        let out = collect(stdout.as_mut()).await;
        let err = collect(stderr.as_mut()).await;
        (status, out, err)
    };
    let completed = match inv.timeout {
        Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
        None => Some(finished.await),
    };

    match completed {
        Some((status_res, stdout, stderr)) => {
            let code = match status_res {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    warn!(command = %inv.command, error = %err, "waiting for process failed");
                    -1
                }
            };
            debug!(command = %inv.command, attempt = inv.attempt, exit_code = code, "process exited");
            AttemptOutcome::Exited {
                code,
                stdout,
                stderr,
            }
        }
        None => {
            info!(
                command = %inv.command,
                attempt = inv.attempt,
                timeout = ?inv.timeout,
                "command timed out; killing process"
            );
            // `kill` also waits for the child, so it is reaped here. It fails
            // harmlessly when only a grandchild was left holding the pipes.
            if let Err(err) = child.kill().await {
                debug!(command = %inv.command, error = %err, "could not kill timed-out process");
            }
            for reader in [stdout, stderr].into_iter().flatten() {
                reader.abort();
            }
            AttemptOutcome::TimedOut
        }
    }
}

fn spawn_reader<R>(mut stream: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(err) = stream.read_to_end(&mut buf).await {
            debug!(error = %err, "error reading process output");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(reader: Option<&mut JoinHandle<String>>) -> String {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

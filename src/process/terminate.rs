//! Two-phase, deadline-bounded child termination.
//!
//! On Unix the child runs in its own process group. Termination sends
//! `SIGTERM` to the whole group, waits up to a grace period, then sends
//! `SIGKILL` and waits once more for a bounded confirmation period. If the
//! kill is still not observed the caller gets [`Termination::Unconfirmed`]
//! and moves on; the orchestrator never blocks on an unresponsive child.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How a terminated child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited within the grace period after the stop request.
    Graceful(ExitStatus),
    /// Exited after being force-killed.
    Forced(ExitStatus),
    /// The forced stop was not observed within the confirmation period.
    Unconfirmed,
}

/// Stop `child`, escalating from a graceful request to a forced kill.
pub async fn terminate(child: &mut Child, grace: Duration, confirm: Duration) -> Termination {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, ?status, "child stopped after SIGTERM");
                return Termination::Graceful(status);
            }
            Ok(Err(e)) => warn!(pid, error = %e, "waiting for child after SIGTERM failed"),
            Err(_) => debug!(pid, grace_ms = grace.as_millis() as u64, "grace period expired"),
        }
        signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed, child may already be gone");
    }

    match timeout(confirm, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "child stopped after forced kill");
            Termination::Forced(status)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "could not confirm child termination");
            Termination::Unconfirmed
        }
        Err(_) => {
            warn!(
                confirm_ms = confirm.as_millis() as u64,
                "child did not exit after forced kill, giving up"
            );
            Termination::Unconfirmed
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!(pid, ?signal, error = %e, "killpg failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .expect("spawn sh")
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let mut child = spawn_sh("sleep 30");
        let start = Instant::now();

        let result = terminate(&mut child, Duration::from_secs(5), Duration::from_secs(1)).await;

        assert!(matches!(result, Termination::Graceful(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_escalates_when_sigterm_ignored() {
        let mut child = spawn_sh("trap '' TERM; while :; do sleep 1; done");
        // Give the shell time to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let start = Instant::now();

        let result =
            terminate(&mut child, Duration::from_millis(300), Duration::from_secs(2)).await;

        assert!(matches!(result, Termination::Forced(_)));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_already_exited_child() {
        let mut child = spawn_sh("exit 0");
        let _ = child.wait().await;

        let result = terminate(&mut child, Duration::from_millis(100), Duration::from_millis(100)).await;

        assert!(child.id().is_none());
        assert!(matches!(result, Termination::Forced(status) if status.success()));
    }
}

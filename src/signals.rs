//! OS signal relay for cooperative cancellation.
//!
//! Interrupt and terminate requests are captured once per run and turned into
//! a [`CancellationToken`] that is handed explicitly to every process
//! execution. Nothing reads process-wide state: code that needs to observe a
//! cancellation receives the token as an argument, so tests can substitute a
//! token they cancel themselves.
//!
//! ```text
//! SIGINT / SIGTERM (Unix), Ctrl+C (Windows)
//!    │
//!    ▼
//! listener task ──► record signal ──► token.cancel()
//!                                        │
//!                                        ▼
//!                         in-flight ProcessExecutor::execute
//!                         terminates the child, returns Interrupted
//! ```
//!
//! At most one delivery is relayed. The loop stops on the first one, so later
//! signals are ignored rather than queued.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;

/// Which OS request triggered the cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Captures OS interrupt/terminate requests into a one-shot cancellation source.
///
/// The listener task is aborted when the relay is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use rooda::signals::SignalRelay;
///
/// let relay = SignalRelay::setup()?;
/// let status = controller.run(&mut state, &relay.token()).await;
/// ```
#[derive(Debug)]
pub struct SignalRelay {
    token: CancellationToken,
    received: Arc<OnceLock<ShutdownSignal>>,
    listener: JoinHandle<()>,
}

impl SignalRelay {
    /// Registers signal handlers and starts the listener task.
    ///
    /// Must be called from within a Tokio runtime. Handlers are registered
    /// before this returns, so a signal arriving immediately afterwards is
    /// not lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses signal handler registration.
    pub fn setup() -> Result<Self> {
        let token = CancellationToken::new();
        let received = Arc::new(OnceLock::new());

        #[cfg(unix)]
        let listener = {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;
            let token = token.clone();
            let received = Arc::clone(&received);

            tokio::spawn(async move {
                let which = tokio::select! {
                    _ = sigint.recv() => ShutdownSignal::Interrupt,
                    _ = sigterm.recv() => ShutdownSignal::Terminate,
                };
                relay(which, &received, &token);
            })
        };

        #[cfg(not(unix))]
        let listener = {
            let token = token.clone();
            let received = Arc::clone(&received);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    relay(ShutdownSignal::Interrupt, &received, &token);
                }
            })
        };

        debug!("signal relay installed");
        Ok(Self {
            token,
            received,
            listener,
        })
    }

    /// Returns a handle to the cancellation source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns the signal that fired, if any.
    #[must_use]
    pub fn received(&self) -> Option<ShutdownSignal> {
        self.received.get().copied()
    }

    /// Returns whether a cancellation has been relayed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn relay(which: ShutdownSignal, received: &OnceLock<ShutdownSignal>, token: &CancellationToken) {
    info!("Received {}, cancelling current iteration", which);
    let _ = received.set(which);
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    #[test]
    fn test_relay_records_first_signal_only() {
        let token = CancellationToken::new();
        let received = OnceLock::new();

        relay(ShutdownSignal::Terminate, &received, &token);
        relay(ShutdownSignal::Interrupt, &received, &token);

        assert!(token.is_cancelled());
        assert_eq!(received.get().copied(), Some(ShutdownSignal::Terminate));
    }

    #[tokio::test]
    async fn test_setup_does_not_cancel_without_signal() {
        let relay = SignalRelay::setup().expect("install relay");
        let token = relay.token();

        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;

        assert!(waited.is_err(), "token should not fire without a signal");
        assert!(!relay.is_cancelled());
        assert_eq!(relay.received(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let relay = SignalRelay::setup().expect("install relay");
        let token = relay.token();

        kill(Pid::this(), Signal::SIGTERM).expect("send SIGTERM to self");

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token should be cancelled after SIGTERM");
        assert_eq!(relay.received(), Some(ShutdownSignal::Terminate));
    }
}

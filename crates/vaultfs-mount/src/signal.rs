//! Shutdown signal handling using signal-hook.
//!
//! The first SIGINT, SIGTERM or SIGHUP requests a graceful shutdown so
//! mounted volumes can be stopped; a second one exits the process
//! immediately.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use tracing::info;

/// Signals that request shutdown.
pub const SHUTDOWN_SIGNALS: &[i32] = &[SIGINT, SIGTERM, SIGHUP];

#[derive(Debug, Default)]
struct Inner {
    received: Mutex<Option<i32>>,
    cvar: Condvar,
}

/// Shared view of whether shutdown was requested.
///
/// Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Creates a shutdown state with no signal handlers attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs handlers for [`SHUTDOWN_SIGNALS`] and returns the state
    /// they trigger.
    pub fn install() -> io::Result<Self> {
        let forced = Arc::new(AtomicBool::new(false));
        for &sig in SHUTDOWN_SIGNALS {
            // Exits only if the flag below was already set by an earlier signal
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&forced))?;
            flag::register(sig, Arc::clone(&forced))?;
        }

        let mut signals = Signals::new(SHUTDOWN_SIGNALS)?;
        let shutdown = Self::new();
        let notifier = shutdown.clone();

        std::thread::Builder::new()
            .name("vaultfs-signals".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(
                        signal = signal_name(sig).unwrap_or("unknown"),
                        "Shutdown requested (send again to force exit)"
                    );
                    notifier.trigger(sig);
                }
            })?;

        Ok(shutdown)
    }

    /// Marks shutdown as requested by `signal` and wakes every waiter.
    pub fn trigger(&self, signal: i32) {
        let mut received = self.inner.received.lock();
        received.get_or_insert(signal);
        self.inner.cvar.notify_all();
    }

    /// Signal that requested shutdown, if any.
    pub fn received(&self) -> Option<i32> {
        *self.inner.received.lock()
    }

    /// Returns true once shutdown was requested.
    pub fn is_requested(&self) -> bool {
        self.received().is_some()
    }

    /// Blocks until shutdown is requested and returns the signal.
    pub fn wait(&self) -> i32 {
        let mut received = self.inner.received.lock();
        loop {
            if let Some(sig) = *received {
                return sig;
            }
            self.inner.cvar.wait(&mut received);
        }
    }

    /// Blocks until shutdown is requested or `timeout` expires.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<i32> {
        let mut received = self.inner.received.lock();
        if received.is_none() {
            let _ = self.inner.cvar.wait_for(&mut received, timeout);
        }
        *received
    }
}

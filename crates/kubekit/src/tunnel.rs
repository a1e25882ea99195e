//! Cancellation and background port-forward tunnels.
//!
//! A [`Tunnel`] keeps `kubectl port-forward` running on a scoped thread for
//! as long as its owner needs it. Dropping the tunnel cancels it and joins
//! the thread, so every exit path of the owner tears it down.

use crate::backend::Cluster;
use crate::types::Backoff;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// Cancel token
// ============================================================================

#[derive(Debug)]
struct Signal {
    canceled: Mutex<bool>,
    cond: Condvar,
    deadline: Option<Instant>,
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag. Once the deadline passes the token reports
/// itself canceled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<Signal>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that only fires when [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            signal: Arc::new(Signal {
                canceled: Mutex::new(false),
                cond: Condvar::new(),
                deadline,
            }),
        }
    }

    /// Fire the token and wake every waiter.
    pub fn cancel(&self) {
        let mut canceled = self
            .signal
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *canceled = true;
        self.signal.cond.notify_all();
    }

    /// Whether the token fired or its deadline passed.
    pub fn is_canceled(&self) -> bool {
        let canceled = *self
            .signal
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        canceled || self.remaining() == Some(Duration::ZERO)
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.signal
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Block for up to `timeout`; returns `true` if the token fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut until = Instant::now() + timeout;
        if let Some(deadline) = self.signal.deadline {
            until = until.min(deadline);
        }

        let mut canceled = self
            .signal
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*canceled {
            let now = Instant::now();
            if now >= until {
                break;
            }
            canceled = self
                .signal
                .cond
                .wait_timeout(canceled, until - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(canceled);

        self.is_canceled()
    }
}

// ============================================================================
// Tunnel
// ============================================================================

/// What a tunnel thread observed during its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelReport {
    /// How many times the port-forward was restarted
    pub restarts: u32,
    /// The last error reported by a port-forward run
    pub last_error: Option<String>,
}

/// A background port-forward bound to a thread scope.
pub struct Tunnel<'scope> {
    token: CancelToken,
    handle: Option<ScopedJoinHandle<'scope, TunnelReport>>,
}

impl<'scope> Tunnel<'scope> {
    /// Start a port-forward with `flags` on a thread of `scope`.
    ///
    /// The port-forward is restarted with `backoff` whenever it exits, until
    /// `token` fires.
    pub fn spawn<'env, C>(
        scope: &'scope Scope<'scope, 'env>,
        cluster: &'env C,
        flags: &str,
        token: CancelToken,
        backoff: Backoff,
    ) -> Self
    where
        C: Cluster + ?Sized,
    {
        let flags = flags.to_string();
        let thread_token = token.clone();
        let handle = scope.spawn(move || keep_forwarding(cluster, &flags, &thread_token, &backoff));
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// The token controlling this tunnel.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Cancel the tunnel and wait for its thread to finish.
    pub fn stop(mut self) -> TunnelReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> TunnelReport {
        self.token.cancel();
        match self.handle.take().map(ScopedJoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => TunnelReport {
                restarts: 0,
                last_error: Some("tunnel thread panicked".to_string()),
            },
            None => TunnelReport::default(),
        }
    }
}

impl Drop for Tunnel<'_> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let report = self.shutdown();
            if let Some(err) = report.last_error {
                log::debug!("tunnel stopped after {} restarts: {}", report.restarts, err);
            }
        }
    }
}

fn keep_forwarding<C: Cluster + ?Sized>(
    cluster: &C,
    flags: &str,
    token: &CancelToken,
    backoff: &Backoff,
) -> TunnelReport {
    let mut report = TunnelReport::default();
    let mut attempt: u32 = 0;

    while !token.is_canceled() {
        log::debug!("starting port-forward {flags}");
        match cluster.port_forward(flags, token) {
            Ok(()) => log::debug!("port-forward {flags} exited"),
            Err(e) => {
                log::debug!("port-forward {flags} failed: {e}");
                report.last_error = Some(e.to_string());
            }
        }
        if token.is_canceled() {
            break;
        }

        let delay = backoff.delay_for_attempt(attempt);
        attempt = attempt.saturating_add(1);
        report.restarts += 1;
        if token.wait_timeout(delay) {
            break;
        }
    }

    report
}

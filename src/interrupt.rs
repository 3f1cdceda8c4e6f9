//! Interrupt sources polled by the gateway at every evaluation step.
//!
//! The gateway only asks one question, "should the running script abort?",
//! through [`InterruptSource::poll`]. Hosts answer it with a closure, an
//! [`InterruptFlag`] raised from another thread (a signal handler, a UI
//! thread), or either of those wrapped in [`Debounced`] so that one key press
//! seen on several consecutive steps counts once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default window within which repeated interrupts are ignored
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

pub trait InterruptSource {
    /// True if the running evaluation should stop now
    fn poll(&mut self) -> bool;
}

impl<F: FnMut() -> bool> InterruptSource for F {
    fn poll(&mut self) -> bool {
        self()
    }
}

/// Source that never interrupts
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl InterruptSource for NeverInterrupt {
    fn poll(&mut self) -> bool {
        false
    }
}

/// Cloneable interrupt flag, safe to raise from any thread.
///
/// Polling consumes the flag: one `raise` stops at most one evaluation.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl InterruptSource for InterruptFlag {
    fn poll(&mut self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Ignores interrupts reported within `window` of the last accepted one
#[derive(Debug)]
pub struct Debounced<S> {
    inner: S,
    window: Duration,
    last_accepted: Option<Instant>,
}

impl<S: InterruptSource> Debounced<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Debounced {
            inner,
            window,
            last_accepted: None,
        }
    }

    pub fn with_default_window(inner: S) -> Self {
        Self::new(inner, DEFAULT_DEBOUNCE)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub(crate) fn poll_at(&mut self, now: Instant) -> bool {
        if !self.inner.poll() {
            return false;
        }

        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                debug!(window = ?self.window, "interrupt ignored within debounce window");
                false
            }
            _ => {
                debug!("interrupt accepted");
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

impl<S: InterruptSource> InterruptSource for Debounced<S> {
    fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }
}

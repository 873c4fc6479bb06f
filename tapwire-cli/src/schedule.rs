//! Cancellable one-shot and repeating timers
//!
//! A [`Timer`] runs its handler on a thread it owns. Stopping the timer
//! cancels the thread's [`CancellationToken`] and joins it, so no handler
//! runs after [`Timer::stop`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Shared cancellation flag that sleeping threads can wait on
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake every waiter
    pub fn cancel(&self) {
        *self.state.cancelled.lock() = true;
        self.state.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Block until cancelled
    pub fn wait(&self) {
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            self.state.signal.wait(&mut cancelled);
        }
    }

    /// Block until cancelled or `timeout` elapses; returns whether it was cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self
                .state
                .signal
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

struct Task {
    token: CancellationToken,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs a handler once after a delay, or repeatedly at an interval
#[derive(Default)]
pub struct Timer {
    task: Mutex<Option<Task>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `handler` once after `timeout`.
    ///
    /// Returns `false` without scheduling anything if the timer is already running.
    pub fn set_timeout<F>(&self, handler: F, timeout: Duration) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(move |token| {
            if !token.wait_timeout(timeout) {
                handler();
            }
        })
    }

    /// Invoke `handler` every `interval` until stopped.
    ///
    /// Returns `false` without scheduling anything if the timer is already running.
    pub fn set_interval<F>(&self, mut handler: F, interval: Duration) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(move |token| {
            while !token.wait_timeout(interval) {
                handler();
            }
        })
    }

    fn schedule<F>(&self, body: F) -> bool
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let mut task = self.task.lock();
        if let Some(current) = task.as_ref() {
            if current.running.load(Ordering::SeqCst) {
                warn!("Timer is already ticking");
                return false;
            }
        }
        if let Some(finished) = task.take() {
            if finished.handle.join().is_err() {
                error!("Timer handler panicked");
            }
        }

        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let spawned = {
            let token = token.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("tapwire-timer".to_string())
                .spawn(move || {
                    body(&token);
                    running.store(false, Ordering::SeqCst);
                })
        };

        match spawned {
            Ok(handle) => {
                *task = Some(Task {
                    token,
                    running,
                    handle,
                });
                debug!("Timer scheduled");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn timer thread");
                false
            }
        }
    }

    /// Cancel the pending handler and wait for the timer thread to exit
    pub fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.token.cancel();

        // A handler stopping its own timer cannot join itself
        if task.handle.thread().id() == thread::current().id() {
            return;
        }
        if task.handle.join().is_err() {
            error!("Timer handler panicked");
        }
        debug!("Timer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| task.running.load(Ordering::SeqCst))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

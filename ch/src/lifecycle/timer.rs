//! Cancellable deferred work on the tokio runtime
//!
//! Both the shutdown trigger and the safety timer are tokio tasks owned by a
//! [`TaskGuard`]; dropping the guard aborts the task, so repeated shutdown
//! attempts never leak timers.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Owns a spawned task; aborts it on drop
#[derive(Debug)]
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl TaskGuard {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `f` once after `delay`, unless the guard is dropped first
pub fn spawn_deferred<F>(runtime: &Handle, delay: Duration, f: F) -> TaskGuard
where
    F: FnOnce() + Send + 'static,
{
    debug!(?delay, "spawn_deferred: called");
    let handle = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    });
    TaskGuard { handle }
}

/// Watchdog that fires once after a timeout unless disarmed
#[derive(Debug)]
pub struct SafetyTimer {
    timeout: Duration,
    guard: TaskGuard,
}

impl SafetyTimer {
    pub fn arm<F>(runtime: &Handle, timeout: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        debug!(?timeout, "SafetyTimer::arm: called");
        let guard = spawn_deferred(runtime, timeout, move || {
            tracing::warn!(?timeout, "Safety timer fired");
            on_fire();
        });
        Self { timeout, guard }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_fired(&self) -> bool {
        self.guard.is_finished()
    }

    /// Cancel the timer; same as dropping it
    pub fn disarm(self) {
        debug!(timeout = ?self.timeout, "SafetyTimer::disarm: called");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_deferred_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let _guard = spawn_deferred(&Handle::current(), Duration::from_millis(10), move || {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_guard_cancels() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let guard = spawn_deferred(&Handle::current(), Duration::from_millis(10), move || {
            flag.store(true, Ordering::SeqCst);
        });
        drop(guard);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_timer_fires_once_at_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = SafetyTimer::arm(&Handle::current(), Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(timer.timeout(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!timer.has_fired());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = SafetyTimer::arm(&Handle::current(), Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst);
        });
        timer.disarm();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}

//! Shutdown state machine
//!
//! ```text
//!            close          Yes
//!   Idle ──────────► ConfirmPending ─────► SavingAndQuitting
//!    ▲                 │      │                  │
//!    └──── Cancelled ──┘      │ No               │ quit / watchdog
//!                             ▼                  ▼
//!                          Terminal ◄────────────┘
//! ```
//!
//! Terminal is absorbing: every later close request is allowed and the bridge
//! is never called again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::timer::{SafetyTimer, TaskGuard, spawn_deferred};
use crate::bridge::{Bridge, ConfirmChoice, Notification, notify_or_log};
use crate::config::LifecycleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Idle,
    ConfirmPending,
    SavingAndQuitting,
    Terminal,
}

/// Answer to the window's close hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Allow,
    Deny,
}

impl CloseDecision {
    pub fn is_allow(self) -> bool {
        self == Self::Allow
    }
}

/// Why the session reached Terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The UI finished its save sequence and called quit
    Completed,
    /// The safety timer expired before the UI finished
    Watchdog,
    /// The process was interrupted (Ctrl-C)
    Interrupted,
    /// The user chose to quit without saving; the host closes the window
    Declined,
}

#[derive(Debug)]
struct Inner {
    state: ShutdownState,
    cause: Option<TerminationCause>,
    trigger: Option<TaskGuard>,
    watchdog: Option<SafetyTimer>,
    quit: Option<TaskGuard>,
}

/// Owns the shutdown state and drives the close/quit handshake
pub struct LifecycleController {
    bridge: Arc<dyn Bridge>,
    config: LifecycleConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
    terminated: watch::Sender<Option<TerminationCause>>,
}

impl LifecycleController {
    pub fn new(bridge: Arc<dyn Bridge>, config: LifecycleConfig, runtime: Handle) -> Arc<Self> {
        debug!(?config, "LifecycleController::new: called");
        let (terminated, _) = watch::channel(None);
        Arc::new(Self {
            bridge,
            config,
            runtime,
            inner: Mutex::new(Inner {
                state: ShutdownState::Idle,
                cause: None,
                trigger: None,
                watchdog: None,
                quit: None,
            }),
            terminated,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ShutdownState {
        self.lock().state
    }

    /// Cause recorded on entering Terminal, if any
    pub fn termination(&self) -> Option<TerminationCause> {
        self.lock().cause
    }

    /// Watch for a termination the process must act on
    ///
    /// `Declined` is never published: the host closes the window itself.
    pub fn subscribe(&self) -> watch::Receiver<Option<TerminationCause>> {
        self.terminated.subscribe()
    }

    /// Resolve once a termination cause is published
    pub async fn wait_terminated(&self) -> TerminationCause {
        let mut rx = self.subscribe();
        loop {
            if let Some(cause) = *rx.borrow_and_update() {
                return cause;
            }
            if rx.changed().await.is_err() {
                // Sender lives in self; unreachable while we hold &self
                std::future::pending::<()>().await;
            }
        }
    }

    /// Window close hook
    ///
    /// Blocks on the confirm prompt when Idle, so call it from a context that
    /// may block. The begin-shutdown notify is deferred onto the runtime so
    /// this returns before the UI is called back.
    pub fn on_close_requested(self: &Arc<Self>) -> CloseDecision {
        debug!("on_close_requested: called");
        {
            let mut inner = self.lock();
            match inner.state {
                ShutdownState::Terminal => {
                    debug!("on_close_requested: terminal, allowing");
                    return CloseDecision::Allow;
                }
                ShutdownState::SavingAndQuitting => {
                    info!("Save-and-quit already in progress, denying close");
                    return CloseDecision::Deny;
                }
                ShutdownState::ConfirmPending => {
                    debug!("on_close_requested: confirm prompt already open, denying");
                    return CloseDecision::Deny;
                }
                ShutdownState::Idle => inner.state = ShutdownState::ConfirmPending,
            }
        }

        let choice = self.bridge.confirm_quit();
        info!(?choice, "Quit confirmation answered");

        let mut inner = self.lock();
        if inner.state != ShutdownState::ConfirmPending {
            // Terminated (quit or interrupt) while the prompt was open
            debug!(state = ?inner.state, "on_close_requested: state moved while prompting");
            return if inner.state == ShutdownState::Terminal {
                CloseDecision::Allow
            } else {
                CloseDecision::Deny
            };
        }

        match choice {
            ConfirmChoice::Yes => {
                inner.state = ShutdownState::SavingAndQuitting;
                inner.trigger = Some(self.spawn_shutdown_trigger());
                inner.watchdog = Some(self.arm_watchdog());
                CloseDecision::Deny
            }
            ConfirmChoice::No => {
                inner.state = ShutdownState::Terminal;
                inner.cause = Some(TerminationCause::Declined);
                info!("Quitting without saving");
                CloseDecision::Allow
            }
            ConfirmChoice::Cancelled => {
                inner.state = ShutdownState::Idle;
                CloseDecision::Deny
            }
        }
    }

    fn spawn_shutdown_trigger(self: &Arc<Self>) -> TaskGuard {
        let weak = Arc::downgrade(self);
        spawn_deferred(&self.runtime, self.config.trigger_delay(), move || {
            let Some(controller) = weak.upgrade() else {
                return;
            };
            if controller.state() != ShutdownState::SavingAndQuitting {
                debug!("shutdown trigger: no longer saving, skipping");
                return;
            }
            info!("Starting UI shutdown sequence");
            notify_or_log(controller.bridge.as_ref(), &Notification::BeginShutdown);
        })
    }

    fn arm_watchdog(self: &Arc<Self>) -> SafetyTimer {
        let weak: Weak<Self> = Arc::downgrade(self);
        SafetyTimer::arm(&self.runtime, self.config.shutdown_timeout(), move || {
            if let Some(controller) = weak.upgrade() {
                warn!("UI did not finish shutting down in time, forcing exit");
                controller.terminate(TerminationCause::Watchdog);
            }
        })
    }

    /// The UI's completion signal
    ///
    /// Terminal is entered after the quit grace period so the caller's reply
    /// can reach the UI first.
    pub fn request_quit(self: &Arc<Self>) {
        debug!("request_quit: called");
        let mut inner = self.lock();
        if inner.state == ShutdownState::Terminal {
            debug!("request_quit: already terminal");
            return;
        }
        if inner.quit.is_some() {
            debug!("request_quit: quit already scheduled");
            return;
        }
        let weak = Arc::downgrade(self);
        inner.quit = Some(spawn_deferred(&self.runtime, self.config.quit_grace(), move || {
            if let Some(controller) = weak.upgrade() {
                controller.terminate(TerminationCause::Completed);
            }
        }));
    }

    /// Enter Terminal now: disarm timers, destroy the window once, publish
    pub fn terminate(&self, cause: TerminationCause) {
        debug!(?cause, "terminate: called");
        let (trigger, watchdog, quit) = {
            let mut inner = self.lock();
            if let Some(existing) = inner.cause {
                debug!(?existing, "terminate: already terminal");
                return;
            }
            inner.state = ShutdownState::Terminal;
            inner.cause = Some(cause);
            (inner.trigger.take(), inner.watchdog.take(), inner.quit.take())
        };
        drop(trigger);
        drop(watchdog);
        drop(quit);

        info!(?cause, "Entering terminal state");
        if let Err(e) = self.bridge.destroy_window() {
            warn!(error = %e, "destroy_window failed");
        }
        self.terminated.send_replace(Some(cause));
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish()
    }
}

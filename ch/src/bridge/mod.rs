//! The UI/host capabilities the shell core depends on
//!
//! The core never talks to a window directly. It asks a [`Bridge`] to run a
//! modal confirm, push a script into the page, or tear the window down.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Answer to the "quit?" prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmChoice {
    /// Save, then quit
    Yes,
    /// Quit without saving
    No,
    /// Dismissed: keep running
    Cancelled,
}

/// One-way signal into the running UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SaveComplete { name: String },
    SaveError { name: String, message: String },
    BeginShutdown,
}

impl Notification {
    /// Render as a script for the page to evaluate
    pub fn to_script(&self) -> String {
        match self {
            Self::SaveComplete { name } => format!("onSaveComplete({})", js_string(name)),
            Self::SaveError { name, message } => {
                format!("onSaveError({}, {})", js_string(name), js_string(message))
            }
            Self::BeginShutdown => "window.ShutdownManager.start(true)".to_string(),
        }
    }
}

/// Encode as a JS string literal; JSON strings are valid JS
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Errors delivering to the UI
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to deliver to UI: {0}")]
    Delivery(String),

    #[error("UI host disconnected")]
    Disconnected,
}

/// Capabilities provided by the window host
///
/// Every method may be called from any thread. Implementations must not
/// call back into the lifecycle controller.
pub trait Bridge: Send + Sync {
    /// Tri-state modal "quit?" query; blocks until answered
    fn confirm_quit(&self) -> ConfirmChoice;

    /// Fire a one-way signal into the UI
    fn notify(&self, notification: &Notification) -> Result<(), BridgeError>;

    /// Tear down the window; safe to call more than once
    fn destroy_window(&self) -> Result<(), BridgeError>;

    /// Folder picker; `None` when nothing was selected
    fn choose_folder(&self) -> Option<PathBuf>;

    /// Image file picker; `None` when cancelled
    fn pick_image(&self) -> Option<PathBuf>;
}

/// Notify, downgrading delivery failures to a warning
///
/// The UI may legitimately be mid-teardown, so a lost notification is never
/// an error for the caller.
pub fn notify_or_log(bridge: &dyn Bridge, notification: &Notification) {
    debug!(?notification, "notify_or_log: called");
    if let Err(e) = bridge.notify(notification) {
        warn!(?notification, error = %e, "Notification not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_scripts() {
        let complete = Notification::SaveComplete {
            name: "desktop.json".to_string(),
        };
        assert_eq!(complete.to_script(), r#"onSaveComplete("desktop.json")"#);
        assert_eq!(
            Notification::BeginShutdown.to_script(),
            "window.ShutdownManager.start(true)"
        );
    }

    #[test]
    fn test_script_strings_are_escaped() {
        let err = Notification::SaveError {
            name: "a\"b".to_string(),
            message: "line1\nline2 </script>".to_string(),
        };
        assert_eq!(err.to_script(), r#"onSaveError("a\"b", "line1\nline2 </script>")"#);
    }

    struct FailingBridge {
        attempts: Mutex<u32>,
    }

    impl Bridge for FailingBridge {
        fn confirm_quit(&self) -> ConfirmChoice {
            ConfirmChoice::Cancelled
        }

        fn notify(&self, _notification: &Notification) -> Result<(), BridgeError> {
            *self.attempts.lock().unwrap() += 1;
            Err(BridgeError::Disconnected)
        }

        fn destroy_window(&self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn choose_folder(&self) -> Option<PathBuf> {
            None
        }

        fn pick_image(&self) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_notify_failure_is_swallowed() {
        let bridge = FailingBridge {
            attempts: Mutex::new(0),
        };
        notify_or_log(&bridge, &Notification::BeginShutdown);
        assert_eq!(*bridge.attempts.lock().unwrap(), 1);
    }

    #[test]
    fn test_confirm_choice_wire_names() {
        assert_eq!(serde_json::to_string(&ConfirmChoice::Cancelled).unwrap(), "\"cancelled\"");
        let yes: ConfirmChoice = serde_json::from_str("\"yes\"").unwrap();
        assert_eq!(yes, ConfirmChoice::Yes);
    }
}

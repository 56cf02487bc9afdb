//! Close/quit handshake between the window host and the UI

mod controller;
mod timer;

pub use controller::{CloseDecision, LifecycleController, ShutdownState, TerminationCause};
pub use timer::{SafetyTimer, TaskGuard, spawn_deferred};

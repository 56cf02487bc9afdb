//! Chomka - desktop shell host for the Chomka web UI
//!
//! The shell sits between a window host and the UI running in it. It owns
//! the quit handshake (confirm, let the UI save, then tear down, with a
//! watchdog in case the UI never finishes) and funnels every filesystem
//! change through one serialized persistence queue.
//!
//! # Architecture
//!
//! ```text
//!  window host ──stdin──► host::serve ──► ShellApi ──► PersistenceQueue
//!       ▲                     │              │
//!       └──────stdout─────────┴── Bridge ◄── LifecycleController
//! ```

pub mod api;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod host;
pub mod lifecycle;

pub use api::{ApiResponse, ShellApi};
pub use bridge::{Bridge, BridgeError, ConfirmChoice, Notification};
pub use config::Config;
pub use lifecycle::{CloseDecision, LifecycleController, ShutdownState, TerminationCause};

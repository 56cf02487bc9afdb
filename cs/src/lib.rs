//! ChomkaStore - serialized, crash-safe persistence for the Chomka shell
//!
//! Every filesystem mutation the UI asks for runs on one worker thread in
//! submission order, and every file is replaced atomically.
//!
//! # Architecture
//!
//! ```text
//! UI request ──► PersistenceQueue ──► StateStore ──► write_atomic
//!                (one worker, FIFO)   (state.json,   (<file>.tmp + rename)
//!                                      coords.txt,
//!                                      assets/)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chomkastore::{PersistenceQueue, StateStore, TaskKind};
//!
//! let queue = PersistenceQueue::spawn()?;
//! let store = StateStore::open("shared_data");
//! queue
//!     .submit_and_wait(TaskKind::SaveState, "theme", move || store.save("theme", "dark".into()), timeout)
//!     .await?;
//! ```

pub mod asset;
pub mod atomic;
pub mod cli;
pub mod error;
pub mod layout;
pub mod queue;
pub mod state;

pub use asset::{AssetPayload, save_asset};
pub use atomic::{write_atomic, write_new};
pub use error::{StoreError, StoreResult};
pub use layout::{CoordCache, LayoutEntry, merge_layout};
pub use queue::{PersistTask, PersistenceQueue, TaskHandle, TaskKind};
pub use state::{DESKTOP_FILE, DESKTOP_ITEMS_KEY, StateDocument, StateStore};

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "shared_data";

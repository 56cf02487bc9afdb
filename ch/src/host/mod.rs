//! Window host over stdin/stdout JSON lines

pub mod messages;
mod server;
mod stdio;

pub use messages::{Inbound, Outbound, QueryKind};
pub use server::{RunOutcome, serve};
pub use stdio::{StdioHost, confirm_from_reply};

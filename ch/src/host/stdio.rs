//! Bridge implementation that talks JSON lines to the window host
//!
//! Outbound messages are written under a mutex, one per line. Queries park
//! the calling thread on a channel until the reader routes the matching
//! `reply`; closing the host drops every parked sender so no query waits on
//! a host that is gone.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, mpsc};

use serde_json::Value;
use tracing::{debug, warn};

use super::messages::{Outbound, QueryKind};
use crate::bridge::{Bridge, BridgeError, ConfirmChoice, Notification};

/// Window host reached over a line-oriented writer (stdout in production)
pub struct StdioHost<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
    pending: Mutex<Pending>,
    next_query: AtomicU64,
    destroyed: AtomicBool,
}

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, mpsc::Sender<Value>>,
}

impl StdioHost<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StdioHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            pending: Mutex::new(Pending::default()),
            next_query: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one message as a line
    pub fn send(&self, message: &Outbound) -> Result<(), BridgeError> {
        let line = message.to_line().map_err(|e| BridgeError::Delivery(e.to_string()))?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| match e.kind() {
                io::ErrorKind::BrokenPipe => BridgeError::Disconnected,
                _ => BridgeError::Delivery(e.to_string()),
            })
    }

    /// `send`, logging instead of failing
    pub fn send_or_log(&self, message: &Outbound) {
        if let Err(e) = self.send(message) {
            warn!(?message, error = %e, "Failed to write to host");
        }
    }

    /// Route a `reply` to the query waiting on it
    pub fn resolve(&self, id: u64, value: Value) {
        debug!(id, "resolve: called");
        match self.pending().waiters.remove(&id) {
            Some(tx) => {
                // Waiter gone is fine; it stopped caring
                let _ = tx.send(value);
            }
            None => warn!(id, "Reply for unknown query"),
        }
    }

    /// The host went away: fail every parked and future query
    pub fn close(&self) {
        let mut pending = self.pending();
        if !pending.closed {
            debug!(waiting = pending.waiters.len(), "close: releasing parked queries");
        }
        pending.closed = true;
        pending.waiters.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.pending().closed
    }

    /// Ask the host a question and block until it answers
    ///
    /// Returns `None` when the host is closed or goes away first.
    fn query(&self, query: QueryKind) -> Option<Value> {
        let id = self.next_query.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        {
            let mut pending = self.pending();
            if pending.closed {
                debug!(?query, "query: host closed, no answer");
                return None;
            }
            pending.waiters.insert(id, tx);
        }

        if let Err(e) = self.send(&Outbound::Query { id, query }) {
            warn!(?query, error = %e, "Failed to send query");
            self.pending().waiters.remove(&id);
            return None;
        }
        debug!(id, ?query, "query: waiting for reply");
        rx.recv().ok()
    }
}

/// Interpret a confirm reply; anything unrecognized is a cancel
pub fn confirm_from_reply(value: &Value) -> ConfirmChoice {
    match value {
        Value::Bool(true) => ConfirmChoice::Yes,
        Value::Bool(false) => ConfirmChoice::No,
        Value::String(s) => match s.as_str() {
            "yes" => ConfirmChoice::Yes,
            "no" => ConfirmChoice::No,
            _ => ConfirmChoice::Cancelled,
        },
        _ => ConfirmChoice::Cancelled,
    }
}

fn path_from_reply(value: Option<Value>) -> Option<PathBuf> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(PathBuf::from(s)),
        _ => None,
    }
}

impl<W: Write + Send> Bridge for StdioHost<W> {
    fn confirm_quit(&self) -> ConfirmChoice {
        self.query(QueryKind::ConfirmQuit)
            .map(|v| confirm_from_reply(&v))
            .unwrap_or(ConfirmChoice::Cancelled)
    }

    fn notify(&self, notification: &Notification) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::Disconnected);
        }
        self.send(&Outbound::Evaluate {
            script: notification.to_script(),
        })
    }

    fn destroy_window(&self) -> Result<(), BridgeError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("destroy_window: already destroyed");
            return Ok(());
        }
        self.send(&Outbound::DestroyWindow)
    }

    fn choose_folder(&self) -> Option<PathBuf> {
        path_from_reply(self.query(QueryKind::ChooseFolder))
    }

    fn pick_image(&self) -> Option<PathBuf> {
        path_from_reply(self.query(QueryKind::PickImage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }

        fn wait_for_lines(&self, count: usize) -> Vec<Value> {
            for _ in 0..500 {
                let lines = self.lines();
                if lines.len() >= count {
                    return lines;
                }
                thread::sleep(Duration::from_millis(5));
            }
            panic!("expected {} lines, got {:?}", count, self.lines());
        }
    }

    #[test]
    fn test_confirm_replies() {
        assert_eq!(confirm_from_reply(&json!("yes")), ConfirmChoice::Yes);
        assert_eq!(confirm_from_reply(&json!(false)), ConfirmChoice::No);
        assert_eq!(confirm_from_reply(&json!(null)), ConfirmChoice::Cancelled);
        assert_eq!(confirm_from_reply(&json!("maybe")), ConfirmChoice::Cancelled);
    }

    #[test]
    fn test_notify_writes_evaluate() {
        let buf = SharedBuf::default();
        let host = StdioHost::new(buf.clone());

        host.notify(&Notification::BeginShutdown).unwrap();

        assert_eq!(
            buf.lines(),
            vec![json!({"type": "evaluate", "script": "window.ShutdownManager.start(true)"})]
        );
    }

    #[test]
    fn test_destroy_is_sent_once() {
        let buf = SharedBuf::default();
        let host = StdioHost::new(buf.clone());

        host.destroy_window().unwrap();
        host.destroy_window().unwrap();

        assert_eq!(buf.lines(), vec![json!({"type": "destroy_window"})]);
    }

    #[test]
    fn test_query_blocks_until_reply() {
        let buf = SharedBuf::default();
        let host = Arc::new(StdioHost::new(buf.clone()));

        let asker = Arc::clone(&host);
        let answer = thread::spawn(move || asker.confirm_quit());

        let lines = buf.wait_for_lines(1);
        assert_eq!(lines[0]["type"], "query");
        assert_eq!(lines[0]["query"], "confirm_quit");
        let id = lines[0]["id"].as_u64().unwrap();

        host.resolve(id, json!("yes"));
        assert_eq!(answer.join().unwrap(), ConfirmChoice::Yes);
    }

    #[test]
    fn test_close_releases_parked_queries() {
        let buf = SharedBuf::default();
        let host = Arc::new(StdioHost::new(buf.clone()));

        let asker = Arc::clone(&host);
        let folder = thread::spawn(move || asker.choose_folder());
        buf.wait_for_lines(1);

        host.close();

        assert_eq!(folder.join().unwrap(), None);
        assert_eq!(host.confirm_quit(), ConfirmChoice::Cancelled);
        assert!(matches!(host.notify(&Notification::BeginShutdown), Err(BridgeError::Disconnected)));
    }

    #[test]
    fn test_folder_reply() {
        let buf = SharedBuf::default();
        let host = Arc::new(StdioHost::new(buf.clone()));

        let asker = Arc::clone(&host);
        let folder = thread::spawn(move || asker.choose_folder());
        let lines = buf.wait_for_lines(1);
        host.resolve(lines[0]["id"].as_u64().unwrap(), json!("/home/me/desk"));

        assert_eq!(folder.join().unwrap(), Some(PathBuf::from("/home/me/desk")));
    }
}

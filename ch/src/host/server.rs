//! Top-level run loop: route host messages until the session ends

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use super::messages::{Inbound, Outbound};
use super::stdio::StdioHost;
use crate::api::ShellApi;
use crate::lifecycle::{CloseDecision, TerminationCause};

/// Why `serve` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The lifecycle reached Terminal and the window was destroyed
    Terminated(TerminationCause),
    /// The host closed our input
    HostClosed,
}

/// Read host messages from `input` until the session ends
///
/// Calls and close requests each run on their own task so the reader keeps
/// routing replies while they block on the host.
pub async fn serve<R, W, I>(api: Arc<ShellApi>, host: Arc<StdioHost<W>>, input: R, interrupt: I) -> Result<RunOutcome>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send + 'static,
    I: Future<Output = ()>,
{
    info!("Host loop started");
    let lifecycle = Arc::clone(api.lifecycle());
    let mut lines = input.lines();

    let terminated = lifecycle.wait_terminated();
    tokio::pin!(terminated);
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            cause = &mut terminated => {
                info!(?cause, "Session terminated");
                host.close();
                return Ok(RunOutcome::Terminated(cause));
            }
            _ = &mut interrupt => {
                info!("Interrupted, shutting down");
                lifecycle.terminate(TerminationCause::Interrupted);
                host.close();
                return Ok(RunOutcome::Terminated(TerminationCause::Interrupted));
            }
            line = lines.next_line() => match line.context("Failed to read from host")? {
                Some(line) => dispatch(&api, &host, &line),
                None => {
                    info!("Host closed input");
                    host.close();
                    return Ok(RunOutcome::HostClosed);
                }
            },
        }
    }
}

fn dispatch<W: Write + Send + 'static>(api: &Arc<ShellApi>, host: &Arc<StdioHost<W>>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let message = match Inbound::parse(line) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed host message");
            return;
        }
    };
    debug!(?message, "dispatch: called");

    match message {
        Inbound::Call { id, method, params } => {
            let api = Arc::clone(api);
            let host = Arc::clone(host);
            tokio::spawn(async move {
                let value = api.call(&method, params).await;
                host.send_or_log(&Outbound::Result { id, value });
            });
        }
        Inbound::CloseRequested { id } => {
            let lifecycle = Arc::clone(api.lifecycle());
            let host = Arc::clone(host);
            tokio::spawn(async move {
                let decision = match tokio::task::spawn_blocking(move || lifecycle.on_close_requested()).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warn!(error = %e, "Close handler failed, denying close");
                        CloseDecision::Deny
                    }
                };
                host.send_or_log(&Outbound::CloseDecision {
                    id,
                    allow: decision.is_allow(),
                });
            });
        }
        Inbound::Reply { id, value } => host.resolve(id, value),
    }
}

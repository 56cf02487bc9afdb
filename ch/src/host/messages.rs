//! JSON-lines messages exchanged with the window host

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host → shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// UI → API call
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    /// The window's close hook fired; answer with `CloseDecision`
    CloseRequested { id: u64 },
    /// Answer to one of our `Query` messages
    Reply {
        id: u64,
        #[serde(default)]
        value: Value,
    },
}

/// Shell → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Result { id: u64, value: Value },
    CloseDecision { id: u64, allow: bool },
    Evaluate { script: String },
    Query { id: u64, query: QueryKind },
    DestroyWindow,
}

/// Modal questions the host answers with `Reply`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Reply value: `"yes"`, `"no"` or `"cancelled"` (or true/false/null)
    ConfirmQuit,
    /// Reply value: a path string, or null
    ChooseFolder,
    /// Reply value: a path string, or null
    PickImage,
}

impl Inbound {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl Outbound {
    /// One line, without the trailing newline
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

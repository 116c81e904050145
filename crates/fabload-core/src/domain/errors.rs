//! Call-level errors and their classification.
//!
//! A `CallError` is a recorded value, not something that unwinds a run: tasks
//! keep it as their last error and report it in their outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a failed call.
///
/// - Transient: the ledger returned a retry-eligible validation code
/// - Persistent: the ledger returned any other non-success code
/// - Transport: no response was produced (delivery failure, timeout)
/// - Endorsement: a read-only response failed endorsement or signature checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Persistent,
    Transport,
    Endorsement,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Persistent => "persistent",
            ErrorKind::Transport => "transport",
            ErrorKind::Endorsement => "endorsement",
        };
        f.write_str(s)
    }
}

/// A classified call failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallError {
    kind: ErrorKind,
    message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transaction_id: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn persistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistent, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn endorsement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Endorsement, message)
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transaction_id {
            Some(tx) => write!(f, "{} error (tx {}): {}", self.kind, tx, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CallError {}

//! LedgerTransport port - the remote call itself.
//!
//! The harness never talks to the network. Whoever embeds it supplies a
//! transport that delivers one request and returns one response; session
//! setup, identities and channel membership live behind this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CallError, Endorsement, QueryResponse, TaskId, Target, TxResponse};

/// One fully expanded call, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub task_id: TaskId,
    pub function: String,
    pub args: Vec<String>,
    pub targets: Vec<Target>,
}

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("target {target} unavailable: {reason}")]
    Unavailable { target: String, reason: String },

    #[error("no response: {0}")]
    NoResponse(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        CallError::transport(err.to_string())
    }
}

#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Send a mutating call and wait until it is committed.
    async fn submit(&self, request: &CallRequest) -> Result<TxResponse, TransportError>;

    /// Send a read-only call and collect the endorsements.
    async fn query(&self, request: &CallRequest) -> Result<QueryResponse, TransportError>;
}

/// Checks an endorser's signature over the response payload.
///
/// Implemented by whoever owns the identities of the network; the harness
/// only asks yes or no.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, endorsement: &Endorsement) -> bool;
}

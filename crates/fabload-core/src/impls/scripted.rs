//! ScriptedTransport - in-memory transport for tests and dry runs.
//!
//! Each function name owns a queue of scripted results that are handed out in
//! order; once a queue is empty the fallback result is used. Every request is
//! recorded so tests can inspect the expanded arguments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::domain::{Endorsement, QueryResponse, TxResponse, ValidationCode};
use crate::ports::{CallRequest, LedgerTransport, SignatureVerifier, TransportError};

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    /// Commit with this validation code. For a query, `Valid` answers with
    /// [`endorsed`] and any other code is rejected.
    Code(ValidationCode),

    /// Fail before any response.
    Transport(TransportError),

    /// Answer a query with this response.
    Query(QueryResponse),
}

pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Scripted,
    calls: Mutex<Vec<CallRequest>>,
    tx_seq: AtomicU64,
}

impl ScriptedTransport {
    /// Every call succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_fallback(Scripted::Code(ValidationCode::Valid))
    }

    pub fn with_fallback(fallback: Scripted) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            tx_seq: AtomicU64::new(0),
        }
    }

    /// Queue results for `function`, appended after anything already queued.
    pub fn script(&self, function: &str, results: impl IntoIterator<Item = Scripted>) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts
            .entry(function.to_string())
            .or_default()
            .extend(results);
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, function: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.function == function)
            .count()
    }

    fn next(&self, request: &CallRequest) -> Scripted {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts
            .get_mut(&request.function)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerTransport for ScriptedTransport {
    async fn submit(&self, request: &CallRequest) -> Result<TxResponse, TransportError> {
        match self.next(request) {
            Scripted::Code(code) => {
                let n = self.tx_seq.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(TxResponse::new(format!("tx-{n}"), code))
            }
            Scripted::Transport(err) => Err(err),
            Scripted::Query(_) => Err(TransportError::Rejected {
                status: 400,
                message: format!("{} is scripted as a query", request.function),
            }),
        }
    }

    async fn query(&self, request: &CallRequest) -> Result<QueryResponse, TransportError> {
        match self.next(request) {
            Scripted::Query(response) => Ok(response),
            Scripted::Code(ValidationCode::Valid) => {
                Ok(endorsed(request.function.as_bytes(), &["peer0", "peer1"]))
            }
            Scripted::Code(code) => Err(TransportError::Rejected {
                status: 500,
                message: format!("query failed with {code}"),
            }),
            Scripted::Transport(err) => Err(err),
        }
    }
}

/// Accepts any non-empty signature.
impl SignatureVerifier for ScriptedTransport {
    fn verify(&self, endorsement: &Endorsement) -> bool {
        !endorsement.signature.is_empty()
    }
}

/// A consistent response: every endorser answers 200 with `payload` and a
/// non-empty signature.
pub fn endorsed(payload: &[u8], endorsers: &[&str]) -> QueryResponse {
    QueryResponse {
        payload: payload.to_vec(),
        endorsements: endorsers
            .iter()
            .map(|name| Endorsement {
                endorser: name.to_string(),
                status: 200,
                payload: payload.to_vec(),
                signature: format!("sig-{name}").into_bytes(),
            })
            .collect(),
    }
}

//! Response handlers applied to read-only call results.
//!
//! A query is only counted as successful once every handler in the chain has
//! accepted the response. Handler failures are endorsement errors and are
//! never retried.

use std::sync::Arc;

use crate::domain::{CallError, QueryResponse};
use crate::ports::SignatureVerifier;

/// Inspects a query response and rejects it if something is off.
pub trait ResponseHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, response: &QueryResponse) -> Result<(), CallError>;
}

/// Handlers run in insertion order; the first rejection wins.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn ResponseHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endorsement consistency first, then signature checks.
    pub fn standard(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self::new()
            .with(EndorsementValidationHandler)
            .with(SignatureValidationHandler::new(verifier))
    }

    pub fn with(mut self, handler: impl ResponseHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handle(&self, response: &QueryResponse) -> Result<(), CallError> {
        for handler in &self.handlers {
            if let Err(err) = handler.handle(response) {
                tracing::debug!(handler = handler.name(), error = %err, "query response rejected");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

/// Requires at least one endorsement, every one with status 200, all
/// carrying the same payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndorsementValidationHandler;

const STATUS_OK: i32 = 200;

impl ResponseHandler for EndorsementValidationHandler {
    fn name(&self) -> &'static str {
        "endorsement-validation"
    }

    fn handle(&self, response: &QueryResponse) -> Result<(), CallError> {
        let Some(first) = response.endorsements.first() else {
            return Err(CallError::endorsement("response carries no endorsements"));
        };

        for e in &response.endorsements {
            if e.status != STATUS_OK {
                return Err(CallError::endorsement(format!(
                    "endorser {} answered with status {}",
                    e.endorser, e.status
                )));
            }
            if e.payload != first.payload {
                return Err(CallError::endorsement(format!(
                    "payload from endorser {} differs from endorser {}",
                    e.endorser, first.endorser
                )));
            }
        }
        Ok(())
    }
}

/// Asks the verifier about every endorsement signature.
pub struct SignatureValidationHandler {
    verifier: Arc<dyn SignatureVerifier>,
}

impl SignatureValidationHandler {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }
}

impl ResponseHandler for SignatureValidationHandler {
    fn name(&self) -> &'static str {
        "signature-validation"
    }

    fn handle(&self, response: &QueryResponse) -> Result<(), CallError> {
        match response.endorsements.iter().find(|e| !self.verifier.verify(e)) {
            Some(bad) => Err(CallError::endorsement(format!(
                "invalid signature from endorser {}",
                bad.endorser
            ))),
            None => Ok(()),
        }
    }
}

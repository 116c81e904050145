//! RunBuilder - wiring and start-up validation.
//!
//! Everything that can be checked before the first call is checked in
//! `build()`, so a bad configuration never produces a half-started run.

use std::sync::Arc;

use super::config::HarnessConfig;
use super::run::Orchestrator;
use crate::expr::SequenceCounter;
use crate::ports::{Clock, IdGenerator, LedgerTransport, SignatureVerifier, SystemClock, UlidGenerator};
use crate::task::{HandlerChain, PolicyError};

/// # Example
/// ```ignore
/// let orchestrator = RunBuilder::new(config)
///     .transport_with_verifier(Arc::new(transport))
///     .build()?;
/// let stats = orchestrator.run(batch, CallMode::Submit).await?;
/// ```
pub struct RunBuilder {
    config: HarnessConfig,
    transport: Option<Arc<dyn LedgerTransport>>,
    handlers: Option<HandlerChain>,
    sequence: Option<Arc<SequenceCounter>>,
    ids: Option<Arc<dyn IdGenerator>>,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no ledger transport configured")]
    MissingTransport,

    #[error("no signature verifier or response handlers configured for query validation")]
    MissingVerifier,

    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error(
        "{iterations} iterations do not fit in {capacity} queue slots; raise queue_capacity"
    )]
    IterationsExceedQueue { iterations: usize, capacity: usize },

    #[error("invalid retry policy: {0}")]
    Retry(#[from] PolicyError),
}

impl RunBuilder {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            transport: None,
            handlers: None,
            sequence: None,
            ids: None,
            clock: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn LedgerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use the standard query handler chain with this verifier.
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.handlers = Some(HandlerChain::standard(verifier));
        self
    }

    /// Transport that also verifies its own endorsements.
    pub fn transport_with_verifier<T>(self, transport: Arc<T>) -> Self
    where
        T: LedgerTransport + SignatureVerifier + 'static,
    {
        let verifier: Arc<dyn SignatureVerifier> = transport.clone();
        self.transport(transport).verifier(verifier)
    }

    /// Replace the query handler chain.
    pub fn handlers(mut self, handlers: HandlerChain) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Defaults to the process-wide counter.
    pub fn sequence(mut self, sequence: Arc<SequenceCounter>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let config = self.config;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let handlers = self.handlers.ok_or(BuildError::MissingVerifier)?;

        if config.concurrency == 0 {
            return Err(BuildError::Zero("concurrency"));
        }
        if config.queue_capacity == 0 {
            return Err(BuildError::Zero("queue_capacity"));
        }
        if config.iterations == 0 {
            return Err(BuildError::Zero("iterations"));
        }
        if config.report_interval_secs == 0 {
            return Err(BuildError::Zero("report_interval_secs"));
        }
        if config.iterations > config.queue_capacity {
            return Err(BuildError::IterationsExceedQueue {
                iterations: config.iterations,
                capacity: config.queue_capacity,
            });
        }
        let policy = config.retry.clone().into_policy()?;

        Ok(Orchestrator {
            settings: config,
            policy,
            transport,
            handlers,
            sequence: self.sequence.unwrap_or_else(SequenceCounter::process),
            ids: self
                .ids
                .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock))),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

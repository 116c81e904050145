//! LeafTask - one remote call with its own retry bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::retry::retry;
use super::{CallBinding, Task, TaskEvent, emit, panicked};
use crate::domain::{CallError, CallMode, CallSpec, InvocationOutcome, TaskId, TxResponse};
use crate::ports::CallRequest;

pub struct LeafTask {
    id: TaskId,
    spec: CallSpec,
    binding: Arc<CallBinding>,
    attempts: AtomicU32,
    last_error: Mutex<Option<CallError>>,
    started: Mutex<Option<Instant>>,
    reported: AtomicBool,
}

/// What a settled call left behind.
#[derive(Debug, Default)]
struct Settled {
    transaction_id: Option<String>,
    payload: Option<Vec<u8>>,
}

impl LeafTask {
    pub fn new(id: TaskId, spec: CallSpec, binding: Arc<CallBinding>) -> Self {
        Self {
            id,
            spec,
            binding,
            attempts: AtomicU32::new(0),
            last_error: Mutex::new(None),
            started: Mutex::new(None),
            reported: AtomicBool::new(false),
        }
    }

    /// Submit and wait for commit, retrying per policy.
    async fn submit(
        &self,
        request: &CallRequest,
        retried: &mut Vec<CallError>,
    ) -> Result<Settled, CallError> {
        let transport = &self.binding.transport;
        let attempts = &self.attempts;
        let transaction_id = retry(
            &self.binding.policy,
            |err| {
                retried.push(err.clone());
                attempts.fetch_add(1, Ordering::SeqCst);
            },
            || async move {
                tracing::debug!(
                    task = %request.task_id,
                    function = %request.function,
                    attempt = attempts.load(Ordering::SeqCst),
                    "submitting"
                );
                let response = transport.submit(request).await?;
                classify(response)
            },
        )
        .await?;

        Ok(Settled {
            transaction_id: Some(transaction_id),
            payload: None,
        })
    }

    /// Query, retrying only the delivery, then run the handler chain once.
    async fn query(
        &self,
        request: &CallRequest,
        retried: &mut Vec<CallError>,
    ) -> Result<Settled, CallError> {
        let transport = &self.binding.transport;
        let attempts = &self.attempts;
        let response = retry(
            &self.binding.policy,
            |err| {
                retried.push(err.clone());
                attempts.fetch_add(1, Ordering::SeqCst);
            },
            || async move {
                tracing::debug!(
                    task = %request.task_id,
                    function = %request.function,
                    attempt = attempts.load(Ordering::SeqCst),
                    "querying"
                );
                transport.query(request).await.map_err(CallError::from)
            },
        )
        .await?;

        self.binding.handlers.handle(&response)?;
        Ok(Settled {
            transaction_id: None,
            payload: Some(response.payload),
        })
    }

    /// Record the terminal result and send the completion event, once per
    /// invoke.
    fn complete(&self, outcome: InvocationOutcome) {
        if self.reported.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = outcome.error.clone();
        emit(&self.binding.events, TaskEvent::Completed(outcome));
    }

    fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map_or(Duration::ZERO, |at| at.elapsed())
    }
}

/// Map a committed transaction's validation code to a call result.
fn classify(response: TxResponse) -> Result<String, CallError> {
    let code = response.validation_code;
    if code.is_valid() {
        return Ok(response.transaction_id);
    }

    let message = format!("transaction invalidated with code {code}");
    let err = if code.is_transient() {
        CallError::transient(message)
    } else {
        CallError::persistent(message)
    };
    Err(err.with_transaction_id(response.transaction_id))
}

#[async_trait]
impl Task for LeafTask {
    fn id(&self) -> TaskId {
        self.id
    }

    async fn invoke(&self) {
        self.attempts.store(1, Ordering::SeqCst);
        self.reported.store(false, Ordering::SeqCst);
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        emit(
            &self.binding.events,
            TaskEvent::Started {
                task_id: self.id,
                function: self.spec.function.clone(),
            },
        );

        let request = CallRequest {
            task_id: self.id,
            function: self.spec.function.clone(),
            args: self.binding.evaluator.evaluate_args(&self.spec.args),
            targets: self.binding.targets.clone(),
        };

        let mut retried = Vec::new();
        let result = match self.binding.mode {
            CallMode::Submit => self.submit(&request, &mut retried).await,
            CallMode::Query => self.query(&request, &mut retried).await,
        };
        let attempts = self.attempts.load(Ordering::SeqCst);
        let (settled, error) = match result {
            Ok(settled) => {
                tracing::debug!(
                    task = %self.id,
                    function = %self.spec.function,
                    attempts,
                    tx_id = settled.transaction_id.as_deref(),
                    payload_len = settled.payload.as_ref().map(Vec::len),
                    "call succeeded"
                );
                (settled, None)
            }
            Err(err) => {
                tracing::debug!(task = %self.id, function = %self.spec.function, attempts, error = %err, "call failed");
                (Settled::default(), Some(err))
            }
        };

        self.complete(InvocationOutcome {
            task_id: self.id,
            function: self.spec.function.clone(),
            attempts,
            duration: self.elapsed(),
            error,
            retried_errors: retried,
            transaction_id: settled.transaction_id,
            payload: settled.payload,
        });
    }

    /// Report the call as a persistent failure unless it already reported.
    fn abandon(&self, reason: &str) {
        self.complete(InvocationOutcome {
            task_id: self.id,
            function: self.spec.function.clone(),
            attempts: self.attempts.load(Ordering::SeqCst),
            duration: self.elapsed(),
            error: Some(panicked(reason)),
            retried_errors: Vec::new(),
            transaction_id: None,
            payload: None,
        });
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn last_error(&self) -> Option<CallError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

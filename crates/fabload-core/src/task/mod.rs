//! Task abstraction: a leaf wraps one remote call, a composite runs an ordered
//! group of tasks as one schedulable unit.
//!
//! Tasks never return call failures to their caller. They report progress on
//! an event channel and keep their own bookkeeping (`attempts`, `last_error`)
//! for inspection after the run.

pub mod composite;
pub mod handler;
pub mod leaf;
pub mod retry;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{CallError, CallMode, InvocationOutcome, TaskId, Target};
use crate::expr::Evaluator;
use crate::ports::LedgerTransport;

pub use composite::CompositeTask;
pub use handler::{
    EndorsementValidationHandler, HandlerChain, ResponseHandler, SignatureValidationHandler,
};
pub use leaf::LeafTask;
pub use retry::{PolicyError, RetryPolicy};

#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> TaskId;

    /// Perform the work. Failures are recorded, not returned.
    async fn invoke(&self);

    /// Tries made so far; 0 before the first invoke.
    fn attempts(&self) -> u32;

    /// Most recent unresolved error, if any.
    fn last_error(&self) -> Option<CallError>;

    /// Called when `invoke` died without finishing. Must send whatever
    /// completion events the task still owes, at most once.
    fn abandon(&self, _reason: &str) {}
}

/// Invoke `task` on its own tokio task so that a panic stays contained.
///
/// Returns the panic message when the task did not run to completion.
pub async fn run_isolated(task: Arc<dyn Task>) -> Result<(), String> {
    match tokio::spawn(async move { task.invoke().await }).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_panic() => Err(panic_message(err.into_panic())),
        Err(err) => Err(err.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |m| (*m).to_string()),
    }
}

/// Terminal error recorded for a task whose invoke panicked.
pub(crate) fn panicked(reason: &str) -> CallError {
    CallError::persistent(format!("task panicked: {reason}"))
}

/// Progress notifications sent by running tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A leaf is about to make its first attempt.
    Started { task_id: TaskId, function: String },

    /// A leaf is done, retries included.
    Completed(InvocationOutcome),

    /// Every member of a group is done. Sent once per group, after the
    /// members' own events.
    GroupCompleted {
        group_id: TaskId,
        members: usize,
        attempts: u32,
        error: Option<CallError>,
    },
}

pub type EventSender = mpsc::UnboundedSender<TaskEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TaskEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Everything a leaf needs besides its own call description. Shared by all
/// leaves of a run.
#[derive(Clone)]
pub struct CallBinding {
    pub evaluator: Evaluator,
    pub transport: Arc<dyn LedgerTransport>,
    pub targets: Vec<Target>,
    pub policy: RetryPolicy,
    pub mode: CallMode,
    pub handlers: HandlerChain,
    pub events: EventSender,
}

impl std::fmt::Debug for CallBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBinding")
            .field("targets", &self.targets)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Send an event; a closed channel only means nobody is listening anymore.
pub(crate) fn emit(events: &EventSender, event: TaskEvent) {
    if events.send(event).is_err() {
        tracing::trace!("event receiver dropped");
    }
}

//! CompositeTask - an ordered group of tasks scheduled as one unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{EventSender, Task, TaskEvent, emit, panicked, run_isolated};
use crate::domain::{CallError, TaskId};

pub struct CompositeTask {
    id: TaskId,
    members: Vec<Arc<dyn Task>>,
    events: EventSender,
    completed: AtomicBool,
}

impl CompositeTask {
    pub fn new(id: TaskId, members: Vec<Arc<dyn Task>>, events: EventSender) -> Self {
        Self {
            id,
            members,
            events,
            completed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn complete(&self, error: Option<CallError>) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(group = %self.id, members = self.members.len(), "group completed");
        emit(
            &self.events,
            TaskEvent::GroupCompleted {
                group_id: self.id,
                members: self.members.len(),
                attempts: self.attempts(),
                error,
            },
        );
    }
}

#[async_trait]
impl Task for CompositeTask {
    fn id(&self) -> TaskId {
        self.id
    }

    /// Members run one after the other, never concurrently. A member that
    /// panics is abandoned and the next one runs. The group completion event
    /// fires once, even if the group is invoked again.
    async fn invoke(&self) {
        for member in &self.members {
            if let Err(reason) = run_isolated(Arc::clone(member)).await {
                tracing::warn!(group = %self.id, task = %member.id(), %reason, "member panicked");
                member.abandon(&reason);
            }
        }

        if self.completed.load(Ordering::SeqCst) {
            tracing::warn!(group = %self.id, "group invoked more than once");
            return;
        }
        self.complete(self.last_error());
    }

    /// Abandon members that never reported, then close the group.
    fn abandon(&self, reason: &str) {
        for member in &self.members {
            member.abandon(reason);
        }
        let error = self.last_error().unwrap_or_else(|| panicked(reason));
        self.complete(Some(error));
    }

    /// Sum over the members.
    fn attempts(&self) -> u32 {
        self.members.iter().map(|m| m.attempts()).sum()
    }

    /// First member error in insertion order.
    fn last_error(&self) -> Option<CallError> {
        self.members.iter().find_map(|m| m.last_error())
    }
}

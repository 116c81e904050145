//! Run statistics, aggregated from task events by the orchestrator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{CallError, InvocationOutcome, RunId, TaskId};
use crate::observability::ProgressCounts;
use crate::task::TaskEvent;

/// A call that ended in error, or an attempt that was retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedInvocation {
    pub task_id: TaskId,
    pub function: String,
    /// Attempts made when the error was recorded.
    pub attempts: u32,
    pub error: CallError,
}

/// What a successful call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallResponse {
    pub task_id: TaskId,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Query payload, decoded as UTF-8 with invalid bytes replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl CallResponse {
    fn from_outcome(outcome: &InvocationOutcome) -> Self {
        Self {
            task_id: outcome.task_id,
            function: outcome.function.clone(),
            transaction_id: outcome.transaction_id.clone(),
            payload: outcome
                .payload
                .as_deref()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
        }
    }
}

/// Average, min and max of a set of duration samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub count: usize,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl DurationSummary {
    /// `None` for an empty sample set.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let min = samples.iter().min().copied()?;
        let max = samples.iter().max().copied()?;
        let total: Duration = samples.iter().sum();
        Some(Self {
            count: samples.len(),
            average: total / samples.len() as u32,
            min,
            max,
        })
    }
}

/// Aggregate results of one run.
///
/// Only the orchestrator writes to it; the progress reporter reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub run_id: RunId,
    pub concurrency: usize,
    pub expected: usize,
    pub groups: usize,
    pub groups_completed: usize,
    pub started: usize,
    pub succeeded: usize,
    pub failures: Vec<FailedInvocation>,
    /// Successful calls in completion order.
    pub responses: Vec<CallResponse>,
    /// Errors seen on attempts that were retried afterwards.
    pub transient_errors: Vec<FailedInvocation>,
    pub total_attempts: u64,
    pub success_durations: Vec<Duration>,
    pub failure_durations: Vec<Duration>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall time from the first submission to the last completion.
    pub elapsed: Duration,
}

impl RunStatistics {
    pub fn new(
        run_id: RunId,
        groups: usize,
        entries_per_group: usize,
        concurrency: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            concurrency,
            expected: groups * entries_per_group,
            groups,
            groups_completed: 0,
            started: 0,
            succeeded: 0,
            failures: Vec::new(),
            responses: Vec::new(),
            transient_errors: Vec::new(),
            total_attempts: 0,
            success_durations: Vec::new(),
            failure_durations: Vec::new(),
            started_at,
            finished_at: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn record(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { .. } => self.started += 1,
            TaskEvent::Completed(outcome) => self.record_outcome(outcome),
            TaskEvent::GroupCompleted { .. } => self.groups_completed += 1,
        }
    }

    fn record_outcome(&mut self, outcome: &InvocationOutcome) {
        self.transient_errors
            .extend(
                outcome
                    .retried_errors
                    .iter()
                    .enumerate()
                    .map(|(i, error)| FailedInvocation {
                        task_id: outcome.task_id,
                        function: outcome.function.clone(),
                        attempts: i as u32 + 1,
                        error: error.clone(),
                    }),
            );

        match &outcome.error {
            None => {
                self.succeeded += 1;
                self.success_durations.push(outcome.duration);
                self.responses.push(CallResponse::from_outcome(outcome));
            }
            Some(error) => {
                self.failures.push(FailedInvocation {
                    task_id: outcome.task_id,
                    function: outcome.function.clone(),
                    attempts: outcome.attempts,
                    error: error.clone(),
                });
                self.failure_durations.push(outcome.duration);
            }
        }
    }

    pub fn progress(&self) -> ProgressCounts {
        ProgressCounts {
            expected: self.expected,
            started: self.started,
            succeeded: self.succeeded,
            failed: self.failures.len(),
        }
    }

    /// Completed invocations, successful or not.
    pub fn invocations(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Invocations per second over the elapsed time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.invocations() as f64 / secs
        } else {
            0.0
        }
    }

    pub fn all_durations(&self) -> Option<DurationSummary> {
        let all: Vec<Duration> = self
            .success_durations
            .iter()
            .chain(&self.failure_durations)
            .copied()
            .collect();
        DurationSummary::from_samples(&all)
    }

    pub fn success_durations(&self) -> Option<DurationSummary> {
        DurationSummary::from_samples(&self.success_durations)
    }

    pub fn failure_durations(&self) -> Option<DurationSummary> {
        DurationSummary::from_samples(&self.failure_durations)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

use serde::{Deserialize, Serialize};

/// Point-in-time progress of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    /// Groups × entries per group.
    pub expected: usize,
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProgressCounts {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn in_flight(&self) -> usize {
        self.started.saturating_sub(self.completed())
    }

    pub fn failure_line(&self) -> String {
        format!("{} failed invocation(s) out of {}", self.failed, self.expected)
    }

    pub fn success_line(&self) -> String {
        format!(
            "{} successful invocation(s) out of {}",
            self.succeeded, self.expected
        )
    }
}

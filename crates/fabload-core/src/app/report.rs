//! Periodic progress lines and the end-of-run summary.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use super::stats::{DurationSummary, RunStatistics};
use crate::observability::ProgressCounts;

/// Reports progress every `interval` until stopped.
pub struct ProgressReporter {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ProgressReporter {
    /// Log the failure and success lines on every tick.
    pub fn spawn(stats: Arc<RwLock<RunStatistics>>, interval: Duration) -> Self {
        Self::spawn_with(stats, interval, |progress| {
            tracing::info!(
                expected = progress.expected,
                in_flight = progress.in_flight(),
                "{}",
                progress.failure_line()
            );
            tracing::info!(expected = progress.expected, "{}", progress.success_line());
        })
    }

    /// Hand a snapshot to `sink` on every tick. The first snapshot is taken
    /// one `interval` after spawning.
    pub fn spawn_with<S>(stats: Arc<RwLock<RunStatistics>>, interval: Duration, mut sink: S) -> Self
    where
        S: FnMut(ProgressCounts) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let progress = stats.read().await.progress();
                        sink(progress);
                    }
                }
            }
        });

        Self { stop_tx, join }
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.join.await {
            tracing::warn!(error = %err, "progress reporter ended abnormally");
        }
    }
}

/// Summary block, or `None` when at most one invocation ran.
pub fn summary_block(stats: &RunStatistics) -> Option<String> {
    if stats.invocations() <= 1 {
        return None;
    }

    let mut out = String::new();
    let _ = writeln!(out, "Invocations:      {}", stats.invocations());
    let _ = writeln!(out, "Concurrency:      {}", stats.concurrency);
    let _ = writeln!(out, "Successful:       {}", stats.succeeded);
    let _ = writeln!(out, "Failed:           {}", stats.failures.len());
    let _ = writeln!(out, "Total attempts:   {}", stats.total_attempts);
    let _ = writeln!(out, "Duration:         {:.3}s", stats.elapsed.as_secs_f64());
    let _ = writeln!(out, "Rate:             {:.2}/s", stats.throughput());
    write_durations(&mut out, "Average", "", stats.all_durations(), |s| s.average);
    write_durations(&mut out, "Average", "success", stats.success_durations(), |s| s.average);
    write_durations(&mut out, "Average", "fail", stats.failure_durations(), |s| s.average);
    write_durations(&mut out, "Min", "success", stats.success_durations(), |s| s.min);
    write_durations(&mut out, "Max", "success", stats.success_durations(), |s| s.max);
    write_durations(&mut out, "Min", "fail", stats.failure_durations(), |s| s.min);
    write_durations(&mut out, "Max", "fail", stats.failure_durations(), |s| s.max);
    Some(out)
}

fn write_durations(
    out: &mut String,
    label: &str,
    class: &str,
    summary: Option<DurationSummary>,
    pick: impl Fn(&DurationSummary) -> Duration,
) {
    let Some(summary) = summary else {
        return;
    };
    let name = if class.is_empty() {
        format!("{label}:")
    } else {
        format!("{label} {class}:")
    };
    let _ = writeln!(out, "{name:<18}{:.3}s", pick(&summary).as_secs_f64());
}

/// Outcome line for a run with exactly one successful invocation, naming the
/// committed transaction or the returned payload.
pub fn response_line(stats: &RunStatistics) -> Option<String> {
    let [response] = stats.responses.as_slice() else {
        return None;
    };
    if stats.invocations() != 1 {
        return None;
    }

    let mut line = format!("invocation succeeded after {} attempt(s)", stats.total_attempts);
    if let Some(tx_id) = &response.transaction_id {
        let _ = write!(line, ", transaction {tx_id}");
    }
    if let Some(payload) = &response.payload {
        let _ = write!(line, ", payload: {payload}");
    }
    Some(line)
}

/// One line per terminal failure, then one per retried attempt.
pub fn failure_report(stats: &RunStatistics) -> Option<String> {
    if stats.failures.is_empty() && stats.transient_errors.is_empty() {
        return None;
    }

    let mut out = String::new();
    if !stats.failures.is_empty() {
        let _ = writeln!(out, "Failed invocations:");
        for f in &stats.failures {
            let _ = writeln!(out, "  {} {} after {} attempt(s): {}", f.task_id, f.function, f.attempts, f.error);
        }
    }
    if !stats.transient_errors.is_empty() {
        let _ = writeln!(out, "Retried errors:");
        for f in &stats.transient_errors {
            let _ = writeln!(out, "  {} {} attempt {}: {}", f.task_id, f.function, f.attempts, f.error);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallError, InvocationOutcome, RunId, TaskId};
    use crate::task::TaskEvent;
    use chrono::Utc;
    use std::sync::Mutex;
    use ulid::Ulid;

    fn stats_with(outcomes: &[(Option<CallError>, u64)]) -> RunStatistics {
        let mut stats = RunStatistics::new(
            RunId::from_ulid(Ulid::new()),
            1,
            outcomes.len(),
            4,
            Utc::now(),
        );
        for (error, millis) in outcomes {
            stats.record(&TaskEvent::Completed(InvocationOutcome {
                task_id: TaskId::from_ulid(Ulid::new()),
                function: "put".into(),
                attempts: 1,
                duration: Duration::from_millis(*millis),
                error: error.clone(),
                retried_errors: Vec::new(),
                transaction_id: None,
                payload: None,
            }));
        }
        stats.total_attempts = outcomes.len() as u64;
        stats.elapsed = Duration::from_secs(1);
        stats
    }

    #[test]
    fn single_invocation_has_no_summary() {
        assert_eq!(summary_block(&stats_with(&[(None, 5)])), None);
    }

    #[test]
    fn summary_lists_counts_and_durations() {
        let stats = stats_with(&[(None, 100), (None, 300), (Some(CallError::persistent("x")), 50)]);
        let block = summary_block(&stats).unwrap();

        assert!(block.contains("Invocations:      3"));
        assert!(block.contains("Concurrency:      4"));
        assert!(block.contains("Successful:       2"));
        assert!(block.contains("Rate:             3.00/s"));
        assert!(block.contains("Average success:  0.200s"));
        assert!(block.contains("Max success:      0.300s"));
        assert!(block.contains("Min fail:         0.050s"));
    }

    #[test]
    fn response_line_names_the_transaction_or_payload() {
        let mut stats = stats_with(&[(None, 5)]);
        stats.responses[0].transaction_id = Some("tx-9".into());
        assert_eq!(
            response_line(&stats).as_deref(),
            Some("invocation succeeded after 1 attempt(s), transaction tx-9")
        );

        stats.responses[0].transaction_id = None;
        stats.responses[0].payload = Some("42".into());
        assert_eq!(
            response_line(&stats).as_deref(),
            Some("invocation succeeded after 1 attempt(s), payload: 42")
        );

        assert_eq!(response_line(&stats_with(&[(None, 1), (None, 1)])), None);
        assert_eq!(response_line(&stats_with(&[(Some(CallError::persistent("x")), 1)])), None);
    }

    #[test]
    fn failure_report_lists_each_failure() {
        let stats = stats_with(&[(None, 1), (Some(CallError::persistent("bad payload")), 1)]);
        let report = failure_report(&stats).unwrap();

        assert!(report.starts_with("Failed invocations:"));
        assert!(report.contains("bad payload"));
        assert!(failure_report(&stats_with(&[(None, 1)])).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_snapshots_each_interval_until_stopped() {
        let stats = Arc::new(RwLock::new(stats_with(&[])));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |progress: ProgressCounts| seen.lock().unwrap().push(progress)
        };
        let reporter = ProgressReporter::spawn_with(Arc::clone(&stats), Duration::from_secs(10), sink);

        tokio::time::sleep(Duration::from_secs(15)).await;
        stats.write().await.record(&TaskEvent::Started {
            task_id: TaskId::from_ulid(Ulid::new()),
            function: "put".into(),
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        reporter.stop().await;

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].started, 0);
            assert_eq!(seen[1].started, 1);
            assert_eq!(seen[1].in_flight(), 1);
            assert_eq!(seen[1].failure_line(), "0 failed invocation(s) out of 0");
            assert_eq!(seen[1].success_line(), "0 successful invocation(s) out of 0");
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}

//! Orchestrator - one batch from parse to statistics.
//!
//! Parse, build one group per iteration, submit every group, aggregate
//! task events until every group has reported completion, then summarize.
//! Individual call failures never abort a run; only a malformed batch or a
//! rejected submission does.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use super::config::HarnessConfig;
use super::report::ProgressReporter;
use super::stats::RunStatistics;
use crate::domain::{CallMode, CallSpec, parse_batch};
use crate::error::HarnessError;
use crate::executor::BoundedExecutor;
use crate::expr::{Evaluator, SequenceCounter, VariableContext};
use crate::ports::{Clock, IdGenerator, LedgerTransport};
use crate::task::{
    CallBinding, CompositeTask, EventSender, HandlerChain, LeafTask, RetryPolicy, Task, TaskEvent,
    event_channel,
};

/// Built by [`super::RunBuilder`]; reusable for several runs.
pub struct Orchestrator {
    pub(super) settings: HarnessConfig,
    pub(super) policy: RetryPolicy,
    pub(super) transport: Arc<dyn LedgerTransport>,
    pub(super) handlers: HandlerChain,
    pub(super) sequence: Arc<SequenceCounter>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) clock: Arc<dyn Clock>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn settings(&self) -> &HarnessConfig {
        &self.settings
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Parse `batch` and run it.
    pub async fn run(&self, batch: &str, mode: CallMode) -> Result<RunStatistics, HarnessError> {
        let specs = parse_batch(batch)?;
        self.run_specs(&specs, mode).await
    }

    /// Run an already parsed batch.
    pub async fn run_specs(
        &self,
        specs: &[CallSpec],
        mode: CallMode,
    ) -> Result<RunStatistics, HarnessError> {
        if specs.is_empty() {
            return Err(HarnessError::Parse("batch contains no calls".to_string()));
        }

        let run_id = self.ids.generate_run_id();
        let (events, mut rx) = event_channel();
        let groups = self.build_groups(specs, mode, &events);
        drop(events);

        let stats = Arc::new(RwLock::new(RunStatistics::new(
            run_id,
            groups.len(),
            specs.len(),
            self.settings.concurrency,
            self.clock.now(),
        )));
        tracing::info!(
            run = %run_id,
            ?mode,
            groups = groups.len(),
            entries = specs.len(),
            concurrency = self.settings.concurrency,
            "run started"
        );

        let reporter =
            ProgressReporter::spawn(Arc::clone(&stats), self.settings.report_interval());
        let executor = BoundedExecutor::new(self.settings.concurrency, self.settings.queue_capacity);
        executor.start();

        let started = Instant::now();
        for (index, group) in groups.iter().enumerate() {
            if index > 0 && self.settings.submit_interval_ms > 0 {
                tokio::time::sleep(self.settings.submit_interval()).await;
            }
            let task: Arc<dyn Task> = group.clone();
            if let Err(source) = executor.submit(task) {
                tracing::warn!(run = %run_id, group = index, error = %source, "submission rejected");
                reporter.stop().await;
                executor.stop(false).await;
                return Err(HarnessError::Submission {
                    group: index,
                    source,
                });
            }
        }

        let mut completed = 0;
        while completed < groups.len() {
            let Some(event) = rx.recv().await else {
                tracing::warn!(run = %run_id, completed, "event channel closed before every group completed");
                break;
            };
            if matches!(event, TaskEvent::GroupCompleted { .. }) {
                completed += 1;
            }
            stats.write().await.record(&event);
        }
        let elapsed = started.elapsed();

        reporter.stop().await;
        executor.stop(true).await;

        let mut stats = stats.write().await;
        stats.elapsed = elapsed;
        stats.total_attempts = groups.iter().map(|g| u64::from(g.attempts())).sum();
        stats.finished_at = Some(self.clock.now());

        tracing::info!(
            run = %run_id,
            succeeded = stats.succeeded,
            failed = stats.failures.len(),
            attempts = stats.total_attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(stats.clone())
    }

    /// One group per iteration. All groups share one evaluator, so `$seq()`
    /// and `$set` values flow across the whole run.
    fn build_groups(
        &self,
        specs: &[CallSpec],
        mode: CallMode,
        events: &EventSender,
    ) -> Vec<Arc<CompositeTask>> {
        let evaluator = Evaluator::new(
            Arc::clone(&self.sequence),
            Arc::new(VariableContext::new()),
        );
        let binding = Arc::new(CallBinding {
            evaluator,
            transport: Arc::clone(&self.transport),
            targets: self.settings.targets.clone(),
            policy: self.policy.clone(),
            mode,
            handlers: self.handlers.clone(),
            events: events.clone(),
        });

        (0..self.settings.iterations)
            .map(|_| {
                let members: Vec<Arc<dyn Task>> = specs
                    .iter()
                    .map(|spec| {
                        Arc::new(LeafTask::new(
                            self.ids.generate_task_id(),
                            spec.clone(),
                            Arc::clone(&binding),
                        )) as Arc<dyn Task>
                    })
                    .collect();
                Arc::new(CompositeTask::new(
                    self.ids.generate_task_id(),
                    members,
                    events.clone(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RunBuilder;
    use crate::app::report::summary_block;
    use crate::domain::{ErrorKind, ValidationCode};
    use crate::domain::{Endorsement, QueryResponse, TxResponse};
    use crate::impls::{Scripted, ScriptedTransport, endorsed};
    use crate::ports::{CallRequest, SignatureVerifier, TransportError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn config(concurrency: usize, attempts: u32) -> HarnessConfig {
        let mut config = HarnessConfig {
            concurrency,
            ..HarnessConfig::default()
        };
        config.retry.attempts = attempts;
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        config
    }

    fn orchestrator(config: HarnessConfig, transport: &Arc<ScriptedTransport>) -> Orchestrator {
        RunBuilder::new(config)
            .transport_with_verifier(Arc::clone(transport))
            .sequence(Arc::new(SequenceCounter::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn random_key_and_padded_value() {
        let transport = Arc::new(ScriptedTransport::new());
        let batch = r#"[{"Func":"put","Args":["key$rand(3)","val$pad(2,X)"]}]"#;

        let stats = orchestrator(config(1, 3), &transport)
            .run(batch, CallMode::Submit)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(["key0", "key1", "key2"].contains(&calls[0].args[0].as_str()));
        assert_eq!(calls[0].args[1], "valXX");
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.total_attempts, 1);
        assert!(summary_block(&stats).is_none());
    }

    #[tokio::test]
    async fn persistent_failure_does_not_abort_the_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("bad", [Scripted::Code(ValidationCode::BadPayload)]);
        let batch = r#"[
            {"Func":"put","Args":["a"]},
            {"Func":"bad","Args":["b"]},
            {"Func":"put","Args":["c"]}
        ]"#;

        let stats = orchestrator(config(2, 3), &transport)
            .run(batch, CallMode::Submit)
            .await
            .unwrap();

        assert_eq!(stats.expected, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].function, "bad");
        assert_eq!(stats.failures[0].error.kind(), ErrorKind::Persistent);
        assert_eq!(stats.total_attempts, 3);
        assert!(summary_block(&stats).is_some());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_and_listed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "put",
            [
                Scripted::Code(ValidationCode::MvccReadConflict),
                Scripted::Transport(TransportError::NoResponse("timeout".into())),
            ],
        );

        let stats = orchestrator(config(1, 3), &transport)
            .run(r#"[{"Func":"put","Args":["k"]}]"#, CallMode::Submit)
            .await
            .unwrap();

        assert!(stats.is_success());
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.transient_errors.len(), 2);
        assert_eq!(stats.transient_errors[1].error.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn iterations_multiply_the_expected_count() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = HarnessConfig {
            iterations: 4,
            ..config(3, 1)
        };
        let batch = r#"[{"Func":"put","Args":["k$seq()"]},{"Func":"get","Args":["k"]}]"#;

        let stats = orchestrator(config, &transport)
            .run(batch, CallMode::Submit)
            .await
            .unwrap();

        assert_eq!(stats.expected, 8);
        assert_eq!(stats.invocations(), 8);
        assert_eq!(stats.groups_completed, 4);
        assert_eq!(stats.started, 8);

        let mut keys: Vec<String> = transport
            .calls()
            .into_iter()
            .filter(|c| c.function == "put")
            .map(|c| c.args[0].clone())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["k1", "k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn set_then_reference_within_a_group() {
        let transport = Arc::new(ScriptedTransport::new());
        let batch = r#"[
            {"Func":"put","Args":["$set(id,item$seq())"]},
            {"Func":"get","Args":["${id}"]}
        ]"#;

        orchestrator(config(1, 1), &transport)
            .run(batch, CallMode::Submit)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].args[0], "item1");
        assert_eq!(calls[1].args[0], "item1");
    }

    #[tokio::test]
    async fn query_mode_validates_endorsements() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "get",
            [Scripted::Query(crate::domain::QueryResponse {
                payload: b"v".to_vec(),
                endorsements: Vec::new(),
            })],
        );
        let batch = r#"[{"Func":"get","Args":["a"]},{"Func":"get","Args":["b"]}]"#;

        let stats = orchestrator(config(1, 3), &transport)
            .run(batch, CallMode::Query)
            .await
            .unwrap();

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].error.kind(), ErrorKind::Endorsement);
        assert_eq!(stats.failures[0].attempts, 1);
    }

    #[tokio::test]
    async fn run_timestamps_come_from_the_clock() {
        use crate::ports::FixedClock;
        use chrono::{TimeZone, Utc};

        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let orchestrator = RunBuilder::new(config(1, 1))
            .transport_with_verifier(Arc::clone(&transport))
            .sequence(Arc::new(SequenceCounter::new()))
            .clock(Arc::new(FixedClock::new(at)))
            .build()
            .unwrap();

        let stats = orchestrator
            .run(r#"[{"Func":"put","Args":["k"]}]"#, CallMode::Submit)
            .await
            .unwrap();

        assert_eq!(stats.started_at, at);
        assert_eq!(stats.finished_at, Some(at));
    }

    /// Panics when asked to call `boom`.
    struct Exploding(ScriptedTransport);

    #[async_trait]
    impl LedgerTransport for Exploding {
        async fn submit(&self, request: &CallRequest) -> Result<TxResponse, TransportError> {
            if request.function == "boom" {
                panic!("boom exploded");
            }
            self.0.submit(request).await
        }

        async fn query(&self, request: &CallRequest) -> Result<QueryResponse, TransportError> {
            self.0.query(request).await
        }
    }

    impl SignatureVerifier for Exploding {
        fn verify(&self, endorsement: &Endorsement) -> bool {
            self.0.verify(endorsement)
        }
    }

    #[tokio::test]
    async fn panicking_call_is_reported_as_a_failure() {
        let transport = Arc::new(Exploding(ScriptedTransport::new()));
        let orchestrator = RunBuilder::new(HarnessConfig {
            iterations: 2,
            ..config(2, 3)
        })
        .transport_with_verifier(transport)
        .sequence(Arc::new(SequenceCounter::new()))
        .build()
        .unwrap();
        let batch = r#"[
            {"Func":"put","Args":["a"]},
            {"Func":"boom","Args":["b"]},
            {"Func":"put","Args":["c"]}
        ]"#;

        let stats = tokio::time::timeout(
            Duration::from_secs(10),
            orchestrator.run(batch, CallMode::Submit),
        )
        .await
        .expect("run finishes")
        .unwrap();

        assert_eq!(stats.groups_completed, 2);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failures.len(), 2);
        for failure in &stats.failures {
            assert_eq!(failure.function, "boom");
            assert_eq!(failure.error.kind(), ErrorKind::Persistent);
            assert!(failure.error.message().contains("boom exploded"));
        }
    }

    #[tokio::test]
    async fn oversized_pad_is_sent_verbatim() {
        let transport = Arc::new(ScriptedTransport::new());
        let batch = r#"[{"Func":"put","Args":["$pad(18446744073709551615,ab)"]}]"#;

        let stats = orchestrator(config(1, 1), &transport)
            .run(batch, CallMode::Submit)
            .await
            .unwrap();

        assert!(stats.is_success());
        assert_eq!(transport.calls()[0].args[0], "$pad(18446744073709551615,ab)");
    }

    #[tokio::test]
    async fn responses_carry_transaction_ids_and_payloads() {
        let transport = Arc::new(ScriptedTransport::new());
        let stats = orchestrator(config(1, 1), &transport)
            .run(r#"[{"Func":"put","Args":["k"]}]"#, CallMode::Submit)
            .await
            .unwrap();
        assert_eq!(stats.responses.len(), 1);
        assert_eq!(stats.responses[0].function, "put");
        assert_eq!(stats.responses[0].transaction_id.as_deref(), Some("tx-1"));

        let transport = Arc::new(ScriptedTransport::new());
        transport.script("get", [Scripted::Query(endorsed(b"stored value", &["peer0"]))]);
        let stats = orchestrator(config(1, 1), &transport)
            .run(r#"[{"Func":"get","Args":["k"]}]"#, CallMode::Query)
            .await
            .unwrap();
        assert_eq!(stats.responses[0].transaction_id, None);
        assert_eq!(stats.responses[0].payload.as_deref(), Some("stored value"));
    }

    #[test]
    fn orchestrator_debug_shows_settings() {
        let transport = Arc::new(ScriptedTransport::new());
        let rendered = format!("{:?}", orchestrator(config(3, 2), &transport));

        assert!(rendered.starts_with("Orchestrator"));
        assert!(rendered.contains("concurrency: 3"));
        assert!(rendered.contains("max_attempts: 2"));
    }

    #[tokio::test]
    async fn malformed_batch_fails_before_any_call() {
        let transport = Arc::new(ScriptedTransport::new());

        let err = orchestrator(config(1, 1), &transport)
            .run("{not json", CallMode::Submit)
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Parse(_)));
        assert!(transport.calls().is_empty());
    }
}

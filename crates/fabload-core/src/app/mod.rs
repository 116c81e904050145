//! App - application layer.
//!
//! Combines the task layer, the executor and the ports into a run.
//!
//! # Main components
//! - **RunBuilder**: wiring and fail-fast validation
//! - **Orchestrator**: parse → build → submit → aggregate → summarize
//! - **ProgressReporter**: periodic progress lines
//! - **RunStatistics**: aggregate results of one run

pub mod builder;
pub mod config;
pub mod report;
pub mod run;
pub mod stats;

pub use self::builder::{BuildError, RunBuilder};
pub use self::config::{ConfigError, HarnessConfig, RetryConfig};
pub use self::report::{ProgressReporter, failure_report, response_line, summary_block};
pub use self::run::Orchestrator;
pub use self::stats::{CallResponse, DurationSummary, FailedInvocation, RunStatistics};

//! fabload-core
//!
//! Invocation harness for ledger calls: turns a batch of call descriptions
//! into concurrently executed, individually retried calls and aggregates
//! their results.
//!
//! # Modules
//! - **domain**: IDs, call descriptions, ledger responses, outcomes, call errors
//! - **expr**: argument templating (`$seq()`, `$rand(n)`, `$pad(n,chars)`, `$file(path)`, `$set(name,value)`, `${name}`)
//! - **ports**: transport, signature verification, clock, ID generation
//! - **task**: leaf and composite tasks, retry policy, query response handlers
//! - **executor**: bounded worker pool
//! - **app**: configuration, builder, orchestrator, statistics, reporting
//! - **impls**: scripted and simulated transports

pub mod app;
pub mod domain;
pub mod error;
pub mod executor;
pub mod expr;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod task;

pub use app::{HarnessConfig, Orchestrator, RunBuilder, RunStatistics};
pub use error::HarnessError;

//! Impls - in-process implementations of the ports.
//!
//! - **ScriptedTransport**: scripted answers per function, records requests (tests)
//! - **SimulatedTransport**: random latency and failures (CLI dry runs)
//!
//! A transport for a real ledger network lives outside this crate.

pub mod scripted;
pub mod simulated;

pub use self::scripted::{Scripted, ScriptedTransport, endorsed};
pub use self::simulated::{SimulatedTransport, SimulationProfile};

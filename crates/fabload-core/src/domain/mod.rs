//! Domain model (IDs, call descriptions, responses, outcomes, errors).

pub mod call;
pub mod errors;
pub mod ids;
pub mod outcome;

pub use call::{CallMode, CallSpec, Target, parse_batch};
pub use errors::{CallError, ErrorKind};
pub use ids::{RunId, TaskId};
pub use outcome::{Endorsement, InvocationOutcome, QueryResponse, TxResponse, ValidationCode};

//! Ports - the seams to the outside world.
//!
//! Each trait hides something the harness must not depend on directly: the
//! ledger transport, signature checks, wall-clock time and ID generation.

pub mod clock;
pub mod id_generator;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::transport::{CallRequest, LedgerTransport, SignatureVerifier, TransportError};

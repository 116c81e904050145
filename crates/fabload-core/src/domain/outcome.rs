//! Responses from the ledger and the outcome of one leaf invocation.
//!
//! The harness does not interpret ledger payloads. It only reads the
//! transaction validation code of a submitted call, and the endorsements of a
//! read-only call.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::CallError;
use super::ids::TaskId;

/// Validation code attached to a committed transaction.
///
/// Numeric values follow the ledger's wire enumeration; codes the harness has
/// no special handling for are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    Valid,
    BadPayload,
    BadCreatorSignature,
    BadProposalTxid,
    DuplicateTxid,
    EndorsementPolicyFailure,
    MvccReadConflict,
    PhantomReadConflict,
    Other(i32),
}

impl ValidationCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ValidationCode::Valid,
            2 => ValidationCode::BadPayload,
            4 => ValidationCode::BadCreatorSignature,
            8 => ValidationCode::BadProposalTxid,
            9 => ValidationCode::DuplicateTxid,
            10 => ValidationCode::EndorsementPolicyFailure,
            11 => ValidationCode::MvccReadConflict,
            12 => ValidationCode::PhantomReadConflict,
            other => ValidationCode::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ValidationCode::Valid => 0,
            ValidationCode::BadPayload => 2,
            ValidationCode::BadCreatorSignature => 4,
            ValidationCode::BadProposalTxid => 8,
            ValidationCode::DuplicateTxid => 9,
            ValidationCode::EndorsementPolicyFailure => 10,
            ValidationCode::MvccReadConflict => 11,
            ValidationCode::PhantomReadConflict => 12,
            ValidationCode::Other(code) => code,
        }
    }

    pub fn is_valid(self) -> bool {
        self == ValidationCode::Valid
    }

    /// Duplicate identifier and the two read-conflict codes clear up on their
    /// own when the call is sent again.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ValidationCode::DuplicateTxid
                | ValidationCode::MvccReadConflict
                | ValidationCode::PhantomReadConflict
        )
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationCode::Valid => f.write_str("VALID"),
            ValidationCode::BadPayload => f.write_str("BAD_PAYLOAD"),
            ValidationCode::BadCreatorSignature => f.write_str("BAD_CREATOR_SIGNATURE"),
            ValidationCode::BadProposalTxid => f.write_str("BAD_PROPOSAL_TXID"),
            ValidationCode::DuplicateTxid => f.write_str("DUPLICATE_TXID"),
            ValidationCode::EndorsementPolicyFailure => f.write_str("ENDORSEMENT_POLICY_FAILURE"),
            ValidationCode::MvccReadConflict => f.write_str("MVCC_READ_CONFLICT"),
            ValidationCode::PhantomReadConflict => f.write_str("PHANTOM_READ_CONFLICT"),
            ValidationCode::Other(code) => write!(f, "CODE_{code}"),
        }
    }
}

/// Response to a submitted (mutating) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub transaction_id: String,
    pub validation_code: ValidationCode,
}

impl TxResponse {
    pub fn new(transaction_id: impl Into<String>, validation_code: ValidationCode) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            validation_code,
        }
    }
}

/// One peer's endorsement of a read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endorsement {
    pub endorser: String,
    pub status: i32,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Response to a read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub payload: Vec<u8>,
    pub endorsements: Vec<Endorsement>,
}

/// Result of one leaf task, reported to the orchestrator once the task is
/// done (after retries).
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub task_id: TaskId,
    pub function: String,

    /// Attempts made, 1 when the first try settled the call.
    pub attempts: u32,

    /// Time from the first attempt to completion.
    pub duration: Duration,

    /// Terminal error; `None` means success.
    pub error: Option<CallError>,

    /// Errors seen on attempts that were retried.
    pub retried_errors: Vec<CallError>,

    /// Id of the committed transaction, for successful submits.
    pub transaction_id: Option<String>,

    /// Response payload, for successful queries.
    pub payload: Option<Vec<u8>>,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_through_numbers() {
        for code in [0, 2, 4, 8, 9, 10, 11, 12, 255] {
            assert_eq!(ValidationCode::from_code(code).code(), code);
        }
        assert_eq!(ValidationCode::from_code(255), ValidationCode::Other(255));
    }

    #[test]
    fn only_conflicts_and_duplicates_are_transient() {
        assert!(ValidationCode::DuplicateTxid.is_transient());
        assert!(ValidationCode::MvccReadConflict.is_transient());
        assert!(ValidationCode::PhantomReadConflict.is_transient());

        assert!(!ValidationCode::Valid.is_transient());
        assert!(!ValidationCode::EndorsementPolicyFailure.is_transient());
        assert!(!ValidationCode::Other(99).is_transient());
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(ValidationCode::MvccReadConflict.to_string(), "MVCC_READ_CONFLICT");
        assert_eq!(ValidationCode::Other(30).to_string(), "CODE_30");
    }
}

//! Call descriptions: what to call, where, and how.
//!
//! A batch is a JSON array of entries shaped like
//! `{"Func": "put", "Args": ["key$seq()", "value"]}`. Arguments are templates;
//! they are expanded by [`crate::expr::Evaluator`] right before the call is
//! issued.

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// One remote call: a function name and its ordered argument templates.
///
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
    #[serde(rename = "Func")]
    pub function: String,

    #[serde(rename = "Args", default)]
    pub args: Vec<String>,
}

impl CallSpec {
    pub fn new<I, S>(function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A peer the call is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub name: String,

    #[serde(default)]
    pub url: String,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Whether a call mutates the ledger or only reads from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Ordered, committed transaction; the response carries a validation code.
    Submit,

    /// Read-only call; the response carries endorsements that are validated.
    Query,
}

/// Parse a batch description.
///
/// The whole batch is rejected when it is not a JSON array of call entries,
/// when it is empty, or when an entry has no function name. Nothing is built
/// from a batch that fails here.
pub fn parse_batch(input: &str) -> Result<Vec<CallSpec>, HarnessError> {
    let batch: Vec<CallSpec> = serde_json::from_str(input)
        .map_err(|e| HarnessError::Parse(format!("invalid batch JSON: {e}")))?;

    if batch.is_empty() {
        return Err(HarnessError::Parse("batch contains no calls".to_string()));
    }

    if let Some(index) = batch.iter().position(|c| c.function.trim().is_empty()) {
        return Err(HarnessError::Parse(format!(
            "entry {index} has an empty function name"
        )));
    }

    Ok(batch)
}

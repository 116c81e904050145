use thiserror::Error;

use crate::app::builder::BuildError;
use crate::app::config::ConfigError;
use crate::executor::SubmitError;

/// Errors that abort a whole run.
///
/// Call-level failures are never reported through this type; they end up in
/// [`crate::app::RunStatistics`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("malformed batch description: {0}")]
    Parse(String),

    #[error("failed to submit task group {group}: {source}")]
    Submission {
        group: usize,
        #[source]
        source: SubmitError,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

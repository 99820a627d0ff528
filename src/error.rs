/// RecordTable Error Taxonomy
///
/// Index and insert failures are fully reversible: by the time one of these
/// errors reaches the caller, the table it was raised on is exactly as it was
/// before the call. Join, pivot and groupby configuration errors are raised
/// before any record is processed.

use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("duplicate unique key value '{key}' for index '{index}'")]
    DuplicateKey { index: String, key: Value },

    #[error("unique key cannot be null or blank for index '{index}'")]
    NullKeyRejected { index: String },

    #[error("indexed attribute required for join: '{0}'")]
    UnindexedJoinAttribute(String),

    #[error("pivot can only be called using indexed attributes, not indexed: {0:?}")]
    UnindexedPivotAttribute(Vec<String>),

    #[error("summary reports support pivots of 1 to 3 attributes, got {0}")]
    UnsupportedPivotDepth(usize),

    #[error("attribute not found: '{0}'")]
    UnknownAttribute(String),

    #[error("aggregator for output '{output}' failed: {reason}")]
    AggregationFailure { output: String, reason: String },

    #[error("unknown aggregator '{0}'")]
    UnknownAggregator(String),

    #[error("malformed rollup specification '{0}'")]
    InvalidRollup(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

impl Error {
    /// Build an `AggregationFailure` from any displayable cause.
    pub fn aggregation(output: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::AggregationFailure {
            output: output.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use thiserror::Error;

/// Failures raised by period resolution and payout aggregation.
///
/// Every variant aborts the run; no partial report is ever produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayoutError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid session type '{session_type}' for fellow {fellow_id}")]
    InvalidSessionType {
        fellow_id: String,
        session_type: String,
    },

    #[error("invalid rate table: {0}")]
    InvalidRateTable(String),
}

pub type Result<T> = std::result::Result<T, PayoutError>;

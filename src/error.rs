//! Error kinds this crate can surface: three are recoverable and feed the
//! driver's warning ledger, one (`NumericalOverflow`) is fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("malformed event record at line {line}: {reason}")]
    InputShape { line: usize, reason: String },

    #[error("pool state disagrees with event post-state at ts={timestamp} tx={tx_hash}: {detail}")]
    InvariantViolation {
        timestamp: i64,
        tx_hash: String,
        detail: String,
    },

    #[error("strategy precondition failed at ts={timestamp}: {detail}")]
    StrategyPrecondition { timestamp: i64, detail: String },

    #[error("numerical overflow in {op} at ts={timestamp:?}: {detail}")]
    NumericalOverflow {
        op: &'static str,
        timestamp: Option<i64>,
        detail: String,
    },

    #[error("I/O error reading event stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BacktestResult<T> = Result<T, BacktestError>;

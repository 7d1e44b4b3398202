//! Error taxonomy for margin analysis.
//!
//! Construction problems (`Configuration`, `InvalidDistribution`) are fatal and
//! surface immediately. `InsufficientData` is recoverable by accumulating more
//! trials. Root-finding failures are reported per (node, spec) cell.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarginError>;

#[derive(Debug, Error)]
pub enum MarginError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    #[error("insufficient data for {context}: need {needed}, got {got}")]
    InsufficientData {
        context: String,
        needed: usize,
        got: usize,
    },
    #[error("performance surrogate has not been trained")]
    SurrogateNotTrained,
    #[error(transparent)]
    RootFinding(#[from] RootFindingFailure),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("behaviour model error: {0}")]
    Model(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A specification-limit solve that did not converge.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("root finding failed for node {node}, spec {spec}: {reason}")]
pub struct RootFindingFailure {
    pub node: usize,
    pub spec: usize,
    pub reason: String,
}

impl RootFindingFailure {
    pub fn new(node: usize, spec: usize, reason: impl Into<String>) -> Self {
        Self {
            node,
            spec,
            reason: reason.into(),
        }
    }
}

pub(crate) fn ensure_len(context: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        return Ok(());
    }

    Err(MarginError::LengthMismatch {
        context,
        expected,
        got,
    })
}

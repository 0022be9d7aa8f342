use thiserror::Error;

/// Errors surfaced by the allocation path. Callers need to distinguish
/// a bad strategy selector from a failed computation.
#[derive(Debug, Error)]
pub enum AllocateError {
    #[error("unknown strategy '{selector}', expected one of {known}")]
    UnknownStrategy { selector: String, known: String },

    #[error("price matrix has {instruments} instrument(s), need at least 2")]
    TooFewInstruments { instruments: usize },

    #[error("price matrix has {rows} usable return row(s), need at least {min}")]
    InsufficientHistory { rows: usize, min: usize },

    #[error("optimization failed: {0}")]
    Computation(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

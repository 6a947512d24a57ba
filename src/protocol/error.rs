use thiserror::Error;

/// Errors raised for lines that match the interval-report grammar but carry
/// values that cannot be turned into metrics
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Lost packet count {lost} exceeds total {total}")]
    Inconsistent { lost: u64, total: u64 },

    #[error("Loss percentage out of range: {0}%")]
    LossOutOfRange(u32),
}

pub type Result<T> = std::result::Result<T, ParseError>;

use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("`{0}` must be greater than zero")]
    ZeroValue(&'static str),

    #[error("`{name}` must be at least {min}, got {value}")]
    BelowMinimum {
        name: &'static str,
        min: u64,
        value: u64,
    },

    #[error("dirty record percentage limit must be within [0, 1], got {0}")]
    PercentageOutOfRange(f64),

    #[error("dirty record limit must set either `records` or `percentage`")]
    EmptyErrorLimit,
}

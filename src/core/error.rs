use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("at least one historical record is required")]
    InsufficientData,

    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f64),

    #[error("record {index} has a non-finite income or expense value")]
    NonFiniteRecord { index: usize },

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("invalid estimated parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid month label {0:?}, expected e.g. \"March 2024\"")]
    InvalidMonthLabel(String),
}

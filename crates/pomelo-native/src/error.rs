use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("reconn_delay_max ({max}) must not be less than reconn_delay ({delay})")]
    DelayBounds { delay: i64, max: i64 },
}

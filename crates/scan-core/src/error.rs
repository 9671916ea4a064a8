use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal inconsistency: {0}")]
    Inconsistency(String),
}

impl ScanError {
    /// Structural errors abort a whole scan; everything else drops a single
    /// candidate.
    pub fn is_structural(&self) -> bool {
        matches!(self, ScanError::Configuration(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            ScanError::InsufficientData(_) => "insufficient_data",
            ScanError::InvalidData(_) => "invalid_data",
            ScanError::NoData(_) => "no_data",
            ScanError::Upstream(_) => "upstream",
            ScanError::Configuration(_) => "configuration",
            ScanError::Inconsistency(_) => "inconsistency",
        }
    }
}

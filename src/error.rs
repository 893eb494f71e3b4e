use thiserror::Error;

#[derive(Debug, Error)]
pub enum MagexciteError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No harmonics produced for operating point {0}")]
    NoHarmonics(String),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] crate::oracle::OracleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MagexciteError>;

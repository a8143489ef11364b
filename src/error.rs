//! Error types for workpull.
//!
//! One variant per lifecycle stage, so the controller can decide what is
//! fatal (config, connection) and what is only logged (acknowledge,
//! report-failure). Template errors never surface here: the SQL source
//! recovers from them with [`Template::render_or_empty`].
//!
//! [`Template::render_or_empty`]: crate::template::Template::render_or_empty

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("acknowledge error: {0}")]
    Acknowledge(String),

    #[error("report-failure error: {0}")]
    ReportFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Configuration and connection failures end the process in every mode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

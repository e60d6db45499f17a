//! Error types for consentd

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("store error: {store}/{key} - {message}")]
    Store {
        store: String,
        key: String,
        message: String,
    },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("consent service closed")]
    ServiceClosed,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn store(store: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

//! consentd host: configuration and the line-delimited JSON command loop
//! around the consent engine.

pub mod config;
pub mod host;

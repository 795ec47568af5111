//! Error taxonomy.
//!
//! Only setup-time concerns produce errors. Anything that happens inside the
//! request loop (bad status codes, timeouts, refused connections) is an
//! outcome that gets recorded as a metric, never an `Err`.

use thiserror::Error;

/// Top-level error for the fallible parts of a run: configuration and setup.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("malformed test identity `{0}`, expected `username:password`")]
    MalformedIdentity(String),
}

/// Failure to turn a credential into a bearer token.
///
/// Never fatal: the orchestrator downgrades the identity to anonymous.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint returned status {0}")]
    Status(u16),
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token response did not contain an access token")]
    MissingToken,
}

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("cannot parse threshold `{0}`")]
    Parse(String),
    #[error("unknown statistic `{0}`")]
    UnknownStatistic(String),
    #[error("percentile out of range in `{0}`, expected 0..=100")]
    PercentileRange(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error taxonomy shared by the monitor components.
//!
//! Every [`UpstreamError`] is a fetch failure: the caller absorbs it and
//! carries on with an empty or placeholder result. Missing data for a single
//! instrument is not an error at all, it is a placeholder [`crate::models::PricePoint`].

use std::path::PathBuf;
use thiserror::Error;

/// Failure at the upstream API boundary (transport, status or payload)
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Network failure, timeout or client construction error
    #[error("{context}: transport error: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-2xx status
    #[error("{context}: upstream returned HTTP {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    /// The payload could not be interpreted
    #[error("{context}: malformed response: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },

    /// The credential cannot be sent as a header value
    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    /// The shared connection handle was already released
    #[error("upstream client is closed")]
    Closed,
}

/// Failure inside an export sink. Never fatal to shutdown.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("no {0} to export")]
    Empty(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate instrument symbol: {0}")]
    DuplicateSymbol(String),

    #[error("duplicate instrument identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("instrument {symbol} has unsupported decimals {decimals} (max 19)")]
    InvalidDecimals { symbol: String, decimals: u8 },

    #[error("token not found: {0}")]
    UnknownSymbol(String),

    #[error("invalid quote pair '{0}', expected INPUT/OUTPUT")]
    InvalidPair(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("series capacity must be greater than zero")]
    ZeroCapacity,
}

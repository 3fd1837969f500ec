//! Error handling and custom error types
//!
//! Provides unified error handling across the worker using thiserror. Every
//! stage-local failure is one of these variants; [`Error::outcome`] decides
//! whether the queue message is requeued or discarded.

use crate::models::ProcessingOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed job payload: {0}")]
    Decode(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Failed to read original: {0}")]
    Read(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedFormat(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Failed to persist output: {0}")]
    Persist(String),

    #[error("Alert delivery error: {0}")]
    Alert(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Consumer closed: {0}")]
    ConsumerClosed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] lapin::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Classifies a processing failure as retryable or terminal.
    ///
    /// Missing or unreadable originals, encode and persist failures are
    /// transient and requeued. Malformed payloads and images that cannot be
    /// decoded will never get better on redelivery, so they are discarded.
    pub fn outcome(self) -> ProcessingOutcome {
        match self {
            Error::NotFound(_)
            | Error::Read(_)
            | Error::Encode(_)
            | Error::Persist(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Http(_) => ProcessingOutcome::TransientFailure(self),
            _ => ProcessingOutcome::PermanentFailure(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

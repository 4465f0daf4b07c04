// Error handling framework for the actuator core

use thiserror::Error;

/// Payload decoding errors, raised before any step runs
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Payload transport decode failed: {0}")]
    TransportDecode(#[from] base64::DecodeError),

    #[error("Payload JSON decode failed: {0}")]
    JsonDecode(#[from] serde_json::Error),
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field '{field}' failed on the '{rule}' rule")]
    Field { field: String, rule: String },

    #[error("Invalid options: {0}")]
    Options(String),
}

impl ValidationError {
    pub fn field(field: impl Into<String>, rule: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            rule: rule.into(),
        }
    }
}

/// Errors returned by the parameter binder
#[derive(Error, Debug)]
pub enum BindError {
    #[error("Parameter parsing error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Parameter input error: {0}")]
    Validation(#[from] ValidationError),
}

/// Step engine errors
///
/// Only the first failure of a run is ever reported.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("step <{index}>: {name} failed: {error:#}")]
    Failed {
        index: usize,
        name: String,
        error: anyhow::Error,
    },

    #[error("step <{index}>: {name} stopped by request")]
    Stopped { index: usize, name: String },
}

impl StepError {
    /// Index of the step that ended the run
    pub fn index(&self) -> usize {
        match self {
            StepError::Failed { index, .. } | StepError::Stopped { index, .. } => *index,
        }
    }

    /// The action error behind a failed step
    pub fn action_error(&self) -> Option<&anyhow::Error> {
        match self {
            StepError::Failed { error, .. } => Some(error),
            StepError::Stopped { .. } => None,
        }
    }
}

/// Block cipher errors
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Invalid key length {0}: key must be 16, 24 or 32 bytes")]
    InvalidKeyLength(usize),

    #[error("Ciphertext is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

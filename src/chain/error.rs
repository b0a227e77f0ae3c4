//! Error types for ledger-backed ticket validation.

use thiserror::Error;

/// Errors that can occur while validating a service ticket.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid ticket prefix, expected {prefix}")]
    MalformedTicket { prefix: &'static str },

    #[error("Failed to decode {what}: {reason}")]
    DecodeError { what: &'static str, reason: String },

    #[error("Invalid ticket size: got {actual} bytes, expected {expected}")]
    InvalidLength { actual: usize, expected: usize },

    #[error("No service account configured for host {host}")]
    UnknownHost { host: String },

    #[error("Unknown user credential {credential_id}")]
    NotFound { credential_id: String },

    #[error("Instance {instance_id} is a {actual} instance, expected {expected}")]
    WrongContract {
        instance_id: String,
        actual: String,
        expected: &'static str,
    },

    #[error("Credential {credential_id} has no {group}/{attribute} attribute")]
    AttributeMissing {
        credential_id: String,
        group: &'static str,
        attribute: &'static str,
    },

    #[error("Corrupt block {block}: {reason}")]
    CorruptBlock { block: String, reason: String },

    #[error("Latest block is {age_secs}s old, validity window is {window_secs}s")]
    StaleProof { age_secs: u64, window_secs: u64 },

    #[error("No login proof found before reaching the start of the chain")]
    ProofNotFound,

    #[error("Ledger error: {0}")]
    Transport(#[from] ChainError),
}

/// Coarse classification of a [`ValidationError`], for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedTicket,
    DecodeError,
    InvalidLength,
    UnknownHost,
    NotFound,
    WrongContract,
    AttributeMissing,
    CorruptBlock,
    StaleProof,
    ProofNotFound,
    TransportError,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedTicket { .. } => ErrorKind::MalformedTicket,
            ValidationError::DecodeError { .. } => ErrorKind::DecodeError,
            ValidationError::InvalidLength { .. } => ErrorKind::InvalidLength,
            ValidationError::UnknownHost { .. } => ErrorKind::UnknownHost,
            ValidationError::NotFound { .. } => ErrorKind::NotFound,
            ValidationError::WrongContract { .. } => ErrorKind::WrongContract,
            ValidationError::AttributeMissing { .. } => ErrorKind::AttributeMissing,
            ValidationError::CorruptBlock { .. } => ErrorKind::CorruptBlock,
            ValidationError::StaleProof { .. } => ErrorKind::StaleProof,
            ValidationError::ProofNotFound => ErrorKind::ProofNotFound,
            ValidationError::Transport(_) => ErrorKind::TransportError,
        }
    }
}

/// Errors specific to ledger connectivity and queries.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Failed to connect to ledger RPC at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Block height regression: current {current} < expected {expected}")]
    BlockRegression { current: u64, expected: u64 },

    #[error("RPC request failed: {0}")]
    RpcError(String),

    #[error("Block {block} not found")]
    BlockNotFound { block: String },

    #[error("Malformed RPC response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::RpcError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_convert() {
        let err: ValidationError = ChainError::RpcError("timeout".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(err.to_string(), "Ledger error: RPC request failed: timeout");
    }

    #[test]
    fn test_stale_proof_message() {
        let err = ValidationError::StaleProof {
            age_secs: 7200,
            window_secs: 3600,
        };
        assert_eq!(err.kind(), ErrorKind::StaleProof);
        assert!(err.to_string().contains("7200s"));
    }
}

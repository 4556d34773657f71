// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Error types for the QKD system
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.
//! The boundary layer decides how each class maps onto transport status codes;
//! the core only guarantees that every failure is typed.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for QKD operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key does not match the cipher's key size
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Malformed base64 or text encoding
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Envelope too short to hold an IV and an authentication tag
    #[error("Malformed envelope: {len} bytes, need at least {min}")]
    MalformedEnvelope { len: usize, min: usize },

    /// Caller-supplied data failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not enough sifted or reconciled bits to continue
    #[error("Insufficient key material: required {required} bits, available {available}")]
    InsufficientKeyMaterial { required: usize, available: usize },

    /// Measured QBER exceeded the configured threshold
    #[error("Key discarded due to high QBER: {qber:.4} > {threshold:.4}")]
    ProtocolAborted { qber: f64, threshold: f64 },

    /// AEAD tag did not verify (tampering or wrong key)
    #[error("Authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailure,

    /// Decrypting our own ciphertext did not reproduce the plaintext
    #[error("Self-test failed: decrypted message does not match original")]
    SelfTestFailed,
}

impl Error {
    /// Check if error was caused by malformed caller input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyLength { .. }
                | Error::InvalidEncoding(_)
                | Error::MalformedEnvelope { .. }
                | Error::Validation(_)
        )
    }

    /// Check if error signals suspected eavesdropping
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::ProtocolAborted { .. })
    }

    /// Check if error indicates an internal defect rather than a user-facing condition
    pub fn is_defect(&self) -> bool {
        matches!(self, Error::SelfTestFailed)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidEncoding(format!("Invalid base64: {}", e))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::InvalidEncoding(format!("Invalid UTF-8: {}", e))
    }
}

impl From<envy::Error> for Error {
    fn from(e: envy::Error) -> Self {
        Error::Config(format!("Failed to parse environment variables: {}", e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = Error::InvalidKeyLength { expected: 32, actual: 16 };
        assert!(err.is_input_error());
        assert!(!err.is_abort());

        let err = Error::ProtocolAborted { qber: 0.2, threshold: 0.05 };
        assert!(err.is_abort());
        assert!(!err.is_input_error());
        assert!(!err.is_defect());

        assert!(Error::SelfTestFailed.is_defect());
        assert!(!Error::AuthenticationFailure.is_input_error());
    }

    #[test]
    fn test_abort_message_carries_qber() {
        let err = Error::ProtocolAborted { qber: 0.25, threshold: 0.05 };
        assert_eq!(
            err.to_string(),
            "Key discarded due to high QBER: 0.2500 > 0.0500"
        );
    }
}

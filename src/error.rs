//! Error types for attestation encoding, sealing, and signing.
//!
//! Verification failures are *not* errors: they are accumulated in
//! [`crate::verify::VerificationResult`]. [`AttestError`] is reserved for
//! operations that cannot produce a value at all (a digest that fails its
//! construction-time check, bytes that do not decode, a signer that fails).

use thiserror::Error;

/// Errors produced by the attestation core.
#[derive(Error, Debug)]
pub enum AttestError {
    /// A digest value is not lowercase hex of the length its algorithm requires.
    #[error("invalid {algorithm} digest: {reason}")]
    InvalidDigest { algorithm: String, reason: String },

    /// Statement bytes are malformed or miss a required field.
    #[error("statement decode failed: {0}")]
    Decode(String),

    /// A statement cannot be canonically encoded (no subjects, empty predicate type).
    #[error("statement encode failed: {0}")]
    Encode(String),

    /// The DSSE envelope is malformed (bad base64, wrong payload type, no signatures).
    #[error("invalid envelope: {0}")]
    Envelope(String),

    /// The external signer capability reported a failure.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Merkle tree construction or proof lookup failed.
    #[error("merkle tree error: {0}")]
    Merkle(String),

    /// A file could not be read during hashing.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for attestation operations.
pub type Result<T> = std::result::Result<T, AttestError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_digest_display_names_algorithm() {
        let err = AttestError::InvalidDigest {
            algorithm: "sha256".into(),
            reason: "expected 64 hex chars, got 63".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sha256"));
        assert!(msg.contains("got 63"));
    }

    #[test]
    fn io_error_keeps_source() {
        let err = AttestError::Io {
            path: "/tmp/missing".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/tmp/missing"));
    }

    #[test]
    fn attest_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AttestError>();
    }
}

//! Signing and signature-checking capabilities.
//!
//! The core never embeds a signing backend. Callers inject a [`Signer`]
//! (a keyless OIDC service, a KMS, a local key) that turns PAE bytes into a
//! signature and an identity string, and one or more [`SignatureVerifier`]s
//! when checking envelopes. [`ed25519`] is the one backend shipped here,
//! for static keys.
//!
//! [`verify_signed`] composes envelope opening, the single-statement verifier
//! and signature checking. A structurally valid statement with at least one
//! signature accepted by a supplied verifier is raised to
//! [`AssuranceLevel::L2`].

pub mod ed25519;

use crate::envelope::{self, Envelope, PAYLOAD_TYPE};
use crate::error::Result;
use crate::policy::VerifierPolicy;
use crate::statement::{self, Statement};
use crate::verify::{self, AssuranceLevel, SubjectSource, VerificationResult};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub use ed25519::{Ed25519Signer, Ed25519Verifier};

/// External signer capability: given bytes, returns a signature and an
/// identity descriptor, or fails.
pub trait Signer {
    /// Key id recorded in the envelope. `None` leaves `keyid` null.
    fn key_id(&self) -> Option<String> {
        None
    }

    fn sign(&self, message: &[u8]) -> Result<(Vec<u8>, String)>;
}

/// Outcome of a single signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid { reason: String },
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// External verifier capability for one key or identity.
pub trait SignatureVerifier {
    /// Key id this verifier answers for. Envelope signatures carrying a
    /// different key id are not offered to it.
    fn key_id(&self) -> Option<&str> {
        None
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> SignatureCheck;
}

/// An envelope together with who signed it and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedStatement {
    pub envelope: Envelope,
    /// Identity reported by the signer.
    pub identity: String,
    pub signed_at: OffsetDateTime,
}

/// Encodes `statement`, signs its PAE bytes with `signer` and seals the
/// result into an envelope.
pub fn sign_statement(statement: &Statement, signer: &dyn Signer) -> Result<SignedStatement> {
    let payload = statement::encode(statement)?;
    let (sig, identity) = signer.sign(&envelope::pae(PAYLOAD_TYPE, &payload))?;
    debug!(identity = %identity, "statement signed");
    let envelope = envelope::seal(statement, vec![(signer.key_id(), sig)])?;
    Ok(SignedStatement {
        envelope,
        identity,
        signed_at: OffsetDateTime::now_utc(),
    })
}

/// Adds `signer`'s signature to an already sealed envelope. Returns the
/// signer's identity.
pub fn countersign(envelope: &mut Envelope, signer: &dyn Signer) -> Result<String> {
    let (sig, identity) = signer.sign(&envelope.pae_bytes()?)?;
    envelope.add_signature(signer.key_id(), &sig);
    Ok(identity)
}

/// Key ids (or `"<unnamed>"`) of the envelope signatures that at least one
/// verifier accepts.
pub fn accepted_signatures(
    envelope: &Envelope,
    verifiers: &[&dyn SignatureVerifier],
) -> Result<Vec<String>> {
    let message = envelope.pae_bytes()?;
    let mut accepted = Vec::new();
    for (i, entry) in envelope.signatures.iter().enumerate() {
        let Ok(sig) = entry.decode_sig() else {
            warn!(index = i, "skipping signature with invalid base64");
            continue;
        };
        let offered = verifiers.iter().filter(|v| match (entry.keyid.as_deref(), v.key_id()) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        });
        for verifier in offered {
            match verifier.verify(&message, &sig) {
                SignatureCheck::Valid => {
                    accepted.push(entry.keyid.clone().unwrap_or_else(|| "<unnamed>".into()));
                    break;
                }
                SignatureCheck::Invalid { reason } => {
                    debug!(index = i, %reason, "signature rejected");
                }
            }
        }
    }
    Ok(accepted)
}

/// Opens `envelope`, verifies the statement (with the hash phase over
/// `sources`) and checks its signatures.
///
/// Returns `Err` only when the envelope cannot be opened. A statement whose
/// signatures are not accepted by any verifier yields an invalid result.
pub fn verify_signed(
    envelope: &Envelope,
    verifiers: &[&dyn SignatureVerifier],
    sources: &BTreeMap<String, SubjectSource>,
    policy: &VerifierPolicy,
) -> Result<VerificationResult> {
    let statement = envelope::open(envelope)?;
    let mut result = verify::verify_with_files(&statement, sources, policy);

    let accepted = accepted_signatures(envelope, verifiers)?;
    if accepted.is_empty() {
        warn!(signatures = envelope.signatures.len(), "no signature accepted");
        result.fail(format!(
            "No valid signature from a trusted key ({} signature(s) checked)",
            envelope.signatures.len()
        ));
    } else {
        debug!(accepted = ?accepted, "signatures accepted");
        result.elevate(AssuranceLevel::L2);
    }
    Ok(result)
}

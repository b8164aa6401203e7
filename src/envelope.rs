//! DSSE signature envelope.
//!
//! Binds canonical statement bytes to one or more signatures. Every signature
//! is computed over `PAE(payloadType, payload)`:
//!
//! ```text
//! "DSSEv1" SP len(type) SP type SP len(payload) SP payload
//! ```
//!
//! with lengths as ASCII decimal byte counts. The envelope itself performs no
//! signature cryptography; see [`crate::signing`] for that.

use crate::error::{AttestError, Result};
use crate::statement::{self, Statement};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Payload type of every envelope this crate seals or opens.
pub const PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// Pre-authentication encoding of `payload` under `payload_type`.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// DSSE envelope in its JSON wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload_type: String,
    /// Base64 of the canonical statement bytes.
    pub payload: String,
    pub signatures: Vec<EnvelopeSignature>,
}

/// One signature entry. `keyid` is a hint only and is not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    #[serde(default)]
    pub keyid: Option<String>,
    /// Base64 signature over the envelope's PAE bytes.
    pub sig: String,
}

impl EnvelopeSignature {
    pub fn new(keyid: Option<String>, sig: &[u8]) -> Self {
        Self {
            keyid,
            sig: STANDARD.encode(sig),
        }
    }

    pub fn decode_sig(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.sig)
            .map_err(|e| AttestError::Envelope(format!("signature is not valid base64: {e}")))
    }
}

/// Encodes `statement` canonically and wraps it with `signatures`, each a
/// `(key id, raw signature bytes)` pair.
pub fn seal(statement: &Statement, signatures: Vec<(Option<String>, Vec<u8>)>) -> Result<Envelope> {
    if signatures.is_empty() {
        return Err(AttestError::Envelope("cannot seal without a signature".into()));
    }
    let bytes = statement::encode(statement)?;
    Ok(Envelope {
        payload_type: PAYLOAD_TYPE.to_string(),
        payload: STANDARD.encode(bytes),
        signatures: signatures
            .into_iter()
            .map(|(keyid, sig)| EnvelopeSignature::new(keyid, &sig))
            .collect(),
    })
}

/// Decodes the statement carried by `envelope`.
pub fn open(envelope: &Envelope) -> Result<Statement> {
    if envelope.payload_type != PAYLOAD_TYPE {
        return Err(AttestError::Envelope(format!(
            "unexpected payloadType: expected '{PAYLOAD_TYPE}', got '{}'",
            envelope.payload_type
        )));
    }
    statement::decode(&envelope.payload_bytes()?)
}

impl Envelope {
    /// Parses wire JSON and checks the envelope is structurally usable.
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(json)
            .map_err(|e| AttestError::Envelope(format!("malformed envelope JSON: {e}")))?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AttestError::Envelope(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.payload_type.is_empty() {
            return Err(AttestError::Envelope("empty payloadType".into()));
        }
        if self.payload.is_empty() {
            return Err(AttestError::Envelope("empty payload".into()));
        }
        if self.signatures.is_empty() {
            return Err(AttestError::Envelope("no signatures".into()));
        }
        Ok(())
    }

    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.payload)
            .map_err(|e| AttestError::Envelope(format!("payload is not valid base64: {e}")))
    }

    /// The bytes every signature in this envelope must cover.
    pub fn pae_bytes(&self) -> Result<Vec<u8>> {
        Ok(pae(&self.payload_type, &self.payload_bytes()?))
    }

    /// Appends a co-signature over the same payload.
    pub fn add_signature(&mut self, keyid: Option<String>, sig: &[u8]) {
        self.signatures.push(EnvelopeSignature::new(keyid, sig));
    }
}

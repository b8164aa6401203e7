//! Recognises which kind of JSON document a caller handed over and routes it
//! to the matching verifier.

use crate::dbom::{self, Dbom};
use crate::error::{AttestError, Result};
use crate::policy::VerifierPolicy;
use crate::statement::{self, PredicateType};
use crate::verify::{self, VerificationResult};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    /// A DSSE envelope (`payloadType` and `signatures`).
    Envelope,
    /// A bare in-toto statement, with its predicate type.
    Statement(PredicateType),
    /// A Data Bill of Materials (`dbomVersion` and `dbomId`).
    Dbom,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope => f.write_str("signed envelope"),
            Self::Statement(t) => write!(f, "statement ({t})"),
            Self::Dbom => f.write_str("DBOM"),
        }
    }
}

/// Classifies `json` by its top-level keys. Envelopes win over statements,
/// statements over DBOMs.
pub fn detect(json: &str) -> Result<DocumentKind> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| AttestError::Decode(e.to_string()))?;
    let Some(obj) = value.as_object() else {
        return Err(AttestError::Decode("document is not a JSON object".into()));
    };
    if obj.contains_key("payloadType") && obj.contains_key("signatures") {
        return Ok(DocumentKind::Envelope);
    }
    if let Some(uri) = obj.get("predicateType").and_then(Value::as_str) {
        return Ok(DocumentKind::Statement(PredicateType::from_uri(uri)));
    }
    if obj.contains_key("dbomVersion") && obj.contains_key("dbomId") {
        return Ok(DocumentKind::Dbom);
    }
    Err(AttestError::Decode("unrecognised document type".into()))
}

/// Structural verification of any supported document. Signed envelopes are
/// refused here because they need trusted keys; open them with
/// [`crate::signing::verify_signed`].
pub fn verify_document(json: &str, policy: &VerifierPolicy) -> VerificationResult {
    let fail = |msg: String| VerificationResult::conclude(None, 0, 0, vec![msg], Vec::new());
    match detect(json) {
        Err(e) => fail(format!("Type detection failed: {e}")),
        Ok(DocumentKind::Envelope) => {
            fail("Signed envelopes require a trusted verifier key".to_string())
        }
        Ok(DocumentKind::Statement(_)) => match statement::decode(json.as_bytes()) {
            Ok(stmt) => verify::verify(&stmt, policy),
            Err(e) => fail(format!("Parse error: {e}")),
        },
        Ok(DocumentKind::Dbom) => match Dbom::from_json(json) {
            Ok(d) => dbom::verify_dbom(&d, policy),
            Err(e) => fail(format!("Parse error: {e}")),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dbom::{Dataset, DatasetDigest, Source};
    use crate::digest::DigestSet;
    use crate::statement::{encode, Statement, Subject};
    use serde_json::json;

    fn origin_json() -> String {
        let stmt = Statement::new(
            vec![Subject::new("d", DigestSet::sha256("a".repeat(64)).unwrap())],
            PredicateType::Origin,
            json!({
                "origin": {"source": "s", "collectionTimestamp": "2025-01-01T00:00:00Z"},
                "collector": {"id": "c"}
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        String::from_utf8(encode(&stmt).unwrap()).unwrap()
    }

    #[test]
    fn detects_each_kind() {
        assert_eq!(
            detect(&origin_json()).unwrap(),
            DocumentKind::Statement(PredicateType::Origin)
        );
        let env = json!({"payloadType": "application/vnd.in-toto+json", "payload": "", "signatures": []});
        assert_eq!(detect(&env.to_string()).unwrap(), DocumentKind::Envelope);
        let d = Dbom::new(
            "urn:dbom:x",
            Dataset::new("d", DatasetDigest::of_bytes(b"d")),
            vec![Source::new("s")],
        );
        assert_eq!(detect(&d.to_json_pretty().unwrap()).unwrap(), DocumentKind::Dbom);
    }

    #[test]
    fn unknown_predicate_uri_is_still_a_statement() {
        let json = json!({"_type": "https://in-toto.io/Statement/v1", "predicateType": "https://example.com/x/v1"});
        assert!(matches!(
            detect(&json.to_string()).unwrap(),
            DocumentKind::Statement(PredicateType::Other(_))
        ));
    }

    #[test]
    fn rejects_unrecognised_documents() {
        assert!(detect("[]").is_err());
        assert!(detect("not json").is_err());
        assert!(detect(r#"{"hello": "world"}"#).is_err());
    }

    #[test]
    fn verify_document_routes_by_kind() {
        let policy = VerifierPolicy::default();
        assert!(verify_document(&origin_json(), &policy).valid);

        let env = json!({"payloadType": "x", "payload": "", "signatures": []}).to_string();
        let result = verify_document(&env, &policy);
        assert!(!result.valid);
        assert!(result.errors[0].contains("trusted verifier key"));

        let bad = Dbom::new(
            "not-a-urn",
            Dataset::new("d", DatasetDigest::of_bytes(b"d")),
            vec![Source::new("d")],
        );
        let result = verify_document(&bad.to_json_pretty().unwrap(), &policy);
        assert_eq!(result.predicate_type.as_deref(), Some(dbom::DBOM_RESULT_TYPE));
        assert!(!result.valid);

        let result = verify_document(r#"{"nothing": 1}"#, &policy);
        assert!(result.errors[0].starts_with("Type detection failed"));
    }
}

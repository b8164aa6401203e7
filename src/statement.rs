//! in-toto Statement v1 model and its canonical byte encoding.
//!
//! Signatures are computed over the encoded bytes, so [`encode`] must be a
//! function of the statement's logical content only:
//!
//! - top-level fields are emitted in a fixed order: `_type`, `subject`,
//!   `predicateType`, `predicate`
//! - every JSON object inside the predicate is emitted with its keys in
//!   lexicographic order, whatever order they were inserted in
//! - output is compact UTF-8 JSON with no insignificant whitespace
//!
//! [`decode`] is the inverse and rejects anything that is not a well-formed
//! v1 statement with at least one subject and a predicate type.

use crate::digest::DigestSet;
use crate::error::{AttestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};

/// The `_type` URI of every statement this crate produces or accepts.
pub const IN_TOTO_STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

pub const ORIGIN_PREDICATE_TYPE: &str = "https://makoto.dev/origin/v1";
pub const TRANSFORM_PREDICATE_TYPE: &str = "https://makoto.dev/transform/v1";
pub const STREAM_WINDOW_PREDICATE_TYPE: &str = "https://makoto.dev/stream-window/v1";

/// An artifact identified by name and digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub digest: DigestSet,
}

impl Subject {
    pub fn new(name: impl Into<String>, digest: DigestSet) -> Self {
        Self {
            name: name.into(),
            digest,
        }
    }
}

/// Predicate kind, resolved from the `predicateType` URI.
///
/// `Other` carries any URI this crate does not recognise; such statements are
/// accepted and only produce a warning at verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PredicateType {
    Origin,
    Transform,
    StreamWindow,
    Other(String),
}

impl PredicateType {
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            ORIGIN_PREDICATE_TYPE => Self::Origin,
            TRANSFORM_PREDICATE_TYPE => Self::Transform,
            STREAM_WINDOW_PREDICATE_TYPE => Self::StreamWindow,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Origin => ORIGIN_PREDICATE_TYPE,
            Self::Transform => TRANSFORM_PREDICATE_TYPE,
            Self::StreamWindow => STREAM_WINDOW_PREDICATE_TYPE,
            Self::Other(uri) => uri,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

// Equality goes through the URI so `Other("https://makoto.dev/origin/v1")`
// and `Origin` are the same predicate type.
impl PartialEq for PredicateType {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for PredicateType {}

impl Hash for PredicateType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<String> for PredicateType {
    fn from(uri: String) -> Self {
        Self::from_uri(&uri)
    }
}

impl From<&str> for PredicateType {
    fn from(uri: &str) -> Self {
        Self::from_uri(uri)
    }
}

impl From<PredicateType> for String {
    fn from(t: PredicateType) -> Self {
        match t {
            PredicateType::Other(uri) => uri,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for PredicateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-toto Statement v1 binding a predicate to one or more subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    #[serde(rename = "subject")]
    pub subjects: Vec<Subject>,
    pub predicate_type: PredicateType,
    #[serde(default)]
    pub predicate: Map<String, Value>,
}

impl Statement {
    pub fn new(
        subjects: Vec<Subject>,
        predicate_type: impl Into<PredicateType>,
        predicate: Map<String, Value>,
    ) -> Self {
        Self {
            statement_type: IN_TOTO_STATEMENT_TYPE.to_string(),
            subjects,
            predicate_type: predicate_type.into(),
            predicate,
        }
    }

    /// Pretty JSON for humans. Not canonical; never sign these bytes.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AttestError::Encode(e.to_string()))
    }
}

/// Rebuilds `value` with every object's keys in lexicographic order.
pub(crate) fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonical_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonical_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect()
}

/// Field order here is the wire order.
#[derive(Serialize)]
struct CanonicalStatement<'a> {
    #[serde(rename = "_type")]
    statement_type: &'a str,
    subject: &'a [Subject],
    #[serde(rename = "predicateType")]
    predicate_type: &'a str,
    predicate: Map<String, Value>,
}

/// Canonical bytes of `statement`, suitable for hashing and signing.
pub fn encode(statement: &Statement) -> Result<Vec<u8>> {
    if statement.statement_type != IN_TOTO_STATEMENT_TYPE {
        return Err(AttestError::Encode(format!(
            "unexpected statement type: expected '{IN_TOTO_STATEMENT_TYPE}', got '{}'",
            statement.statement_type
        )));
    }
    if statement.subjects.is_empty() {
        return Err(AttestError::Encode("statement has no subjects".into()));
    }
    if statement.predicate_type.as_str().is_empty() {
        return Err(AttestError::Encode("statement has empty predicateType".into()));
    }
    let canonical = CanonicalStatement {
        statement_type: &statement.statement_type,
        subject: &statement.subjects,
        predicate_type: statement.predicate_type.as_str(),
        predicate: canonical_map(&statement.predicate),
    };
    serde_json::to_vec(&canonical).map_err(|e| AttestError::Encode(e.to_string()))
}

/// Parses canonical (or any equivalent JSON) statement bytes.
pub fn decode(bytes: &[u8]) -> Result<Statement> {
    let stmt: Statement =
        serde_json::from_slice(bytes).map_err(|e| AttestError::Decode(e.to_string()))?;
    if stmt.statement_type != IN_TOTO_STATEMENT_TYPE {
        return Err(AttestError::Decode(format!(
            "unexpected statement type: expected '{IN_TOTO_STATEMENT_TYPE}', got '{}'",
            stmt.statement_type
        )));
    }
    if stmt.subjects.is_empty() {
        return Err(AttestError::Decode("statement has no subjects".into()));
    }
    if stmt.predicate_type.as_str().is_empty() {
        return Err(AttestError::Decode("statement has empty predicateType".into()));
    }
    Ok(stmt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subject(name: &str, c: char) -> Subject {
        Subject::new(name, DigestSet::sha256(c.to_string().repeat(64)).unwrap())
    }

    fn as_map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn encode_uses_fixed_field_order() {
        let stmt = Statement::new(
            vec![subject("data.csv", 'a')],
            PredicateType::Origin,
            as_map(json!({"collector": {"id": "c1"}})),
        );
        let text = String::from_utf8(encode(&stmt).unwrap()).unwrap();
        let t = text.find("\"_type\"").unwrap();
        let s = text.find("\"subject\"").unwrap();
        let pt = text.find("\"predicateType\"").unwrap();
        let p = text.find("\"predicate\":").unwrap();
        assert!(t < s && s < pt && pt < p, "field order wrong: {text}");
        assert!(!text.contains('\n'));
    }

    #[test]
    fn encode_ignores_predicate_insertion_order() {
        let mut a = Map::new();
        a.insert("zeta".into(), json!(1));
        a.insert("alpha".into(), json!({"y": 2, "x": [ {"b": 1, "a": 2} ]}));
        let mut b = Map::new();
        b.insert("alpha".into(), json!({"x": [ {"a": 2, "b": 1} ], "y": 2}));
        b.insert("zeta".into(), json!(1));

        let sa = Statement::new(vec![subject("s", 'b')], "https://example.com/p/v1", a);
        let sb = Statement::new(vec![subject("s", 'b')], "https://example.com/p/v1", b);
        assert_eq!(encode(&sa).unwrap(), encode(&sb).unwrap());
        assert_eq!(encode(&sa).unwrap(), encode(&sa).unwrap());
    }

    #[test]
    fn decode_inverts_encode() {
        let stmt = Statement::new(
            vec![subject("in.csv", 'c'), subject("out.csv", 'd')],
            PredicateType::Transform,
            as_map(json!({
                "inputs": [{"name": "in.csv", "digest": {"sha256": "c".repeat(64)}}],
                "transform": {"type": "https://makoto.dev/transforms/filter", "name": "f"},
                "executor": {"id": "e1"},
                "vendorExtension": {"kept": true}
            })),
        );
        let back = decode(&encode(&stmt).unwrap()).unwrap();
        assert_eq!(back, stmt);
        assert_eq!(back.predicate["vendorExtension"]["kept"], json!(true));
    }

    #[test]
    fn decode_rejects_empty_subjects() {
        let bytes = br#"{"_type":"https://in-toto.io/Statement/v1","subject":[],"predicateType":"x","predicate":{}}"#;
        let err = decode(bytes).unwrap_err();
        assert!(matches!(err, AttestError::Decode(_)));
        assert!(err.to_string().contains("no subjects"));
    }

    #[test]
    fn decode_rejects_missing_predicate_type() {
        let bytes = format!(
            r#"{{"_type":"{IN_TOTO_STATEMENT_TYPE}","subject":[{{"name":"a","digest":{{"sha256":"{}"}}}}],"predicate":{{}}}}"#,
            "a".repeat(64)
        );
        assert!(matches!(decode(bytes.as_bytes()), Err(AttestError::Decode(_))));
    }

    #[test]
    fn decode_rejects_wrong_statement_type() {
        let bytes = format!(
            r#"{{"_type":"https://in-toto.io/Statement/v0.1","subject":[{{"name":"a","digest":{{"sha256":"{}"}}}}],"predicateType":"x","predicate":{{}}}}"#,
            "a".repeat(64)
        );
        let err = decode(bytes.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unexpected statement type"));
    }

    #[test]
    fn decode_rejects_garbage_and_trailing_bytes() {
        assert!(decode(b"not json").is_err());
        let stmt = Statement::new(vec![subject("a", 'e')], PredicateType::Origin, Map::new());
        let mut bytes = encode(&stmt).unwrap();
        bytes.extend_from_slice(b"{}");
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_malformed_subject_digest() {
        let bytes = br#"{"_type":"https://in-toto.io/Statement/v1","subject":[{"name":"a","digest":{"sha256":"ABC"}}],"predicateType":"x"}"#;
        assert!(decode(bytes).is_err());
    }

    #[test]
    fn encode_rejects_empty_subjects() {
        let stmt = Statement::new(vec![], PredicateType::Origin, Map::new());
        assert!(matches!(encode(&stmt), Err(AttestError::Encode(_))));
    }

    #[test]
    fn encode_rejects_wrong_statement_type() {
        let mut stmt = Statement::new(vec![subject("a", 'a')], PredicateType::Origin, Map::new());
        stmt.statement_type = "https://in-toto.io/Statement/v0.1".into();
        let err = encode(&stmt).unwrap_err();
        assert!(matches!(err, AttestError::Encode(_)));
        assert!(err.to_string().contains("v0.1"));
    }

    #[test]
    fn predicate_type_resolves_known_uris() {
        assert_eq!(PredicateType::from_uri(ORIGIN_PREDICATE_TYPE), PredicateType::Origin);
        assert_eq!(
            PredicateType::Other(TRANSFORM_PREDICATE_TYPE.into()),
            PredicateType::Transform
        );
        assert!(!PredicateType::from_uri("https://example.com/unknown/v1").is_known());
    }
}

//! Predicate Validator and typed predicate models.
//!
//! Validation runs over the open predicate map carried by a
//! [`Statement`](crate::statement::Statement), not over the typed models, so a
//! predicate that is missing required fields still yields a full list of
//! human-readable errors instead of a single parse failure. Each validator
//! checks required top-level keys and one level of nested required keys; it
//! is not a JSON-Schema engine.
//!
//! The typed models ([`origin::OriginPredicate`],
//! [`transform::TransformPredicate`], [`stream_window::StreamWindowPredicate`])
//! are used to *build* predicates and to read them once validated. Each keeps
//! an `extensions` map so fields it does not model survive a round trip.

pub mod origin;
pub mod stream_window;
pub mod transform;

use crate::error::{AttestError, Result};
use crate::statement::{PredicateType, Statement};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

pub use origin::OriginPredicate;
pub use stream_window::StreamWindowPredicate;
pub use transform::TransformPredicate;

/// Structural validation for `predicate` under `predicate_type`.
///
/// Returns errors in discovery order; an empty vector means structurally
/// valid. Unknown predicate types yield no errors (the caller decides whether
/// to warn).
pub fn validate(predicate_type: &PredicateType, predicate: &Map<String, Value>) -> Vec<String> {
    match predicate_type {
        PredicateType::Origin => origin::validate(predicate),
        PredicateType::Transform => transform::validate(predicate),
        PredicateType::StreamWindow => stream_window::validate(predicate),
        PredicateType::Other(_) => Vec::new(),
    }
}

/// A predicate body with a fixed predicate type.
pub trait PredicateBody: Serialize + DeserializeOwned {
    const KIND: PredicateType;

    /// Converts the typed body into the open map a statement carries.
    fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).map_err(|e| AttestError::Encode(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(AttestError::Encode(format!(
                "predicate serialized to {other}, expected an object"
            ))),
        }
    }

    /// Reads the typed body out of an open predicate map.
    fn from_map(map: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
            AttestError::Decode(format!("{} predicate: {e}", Self::KIND))
        })
    }
}

/// Typed view over a statement's predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedPredicate {
    Origin(OriginPredicate),
    Transform(TransformPredicate),
    StreamWindow(StreamWindowPredicate),
    /// Unrecognised predicate type; the body is kept verbatim.
    Opaque(Map<String, Value>),
}

impl TypedPredicate {
    /// Parses the statement's predicate into its typed form.
    pub fn from_statement(statement: &Statement) -> Result<Self> {
        let map = &statement.predicate;
        Ok(match statement.predicate_type {
            PredicateType::Origin => Self::Origin(OriginPredicate::from_map(map)?),
            PredicateType::Transform => Self::Transform(TransformPredicate::from_map(map)?),
            PredicateType::StreamWindow => {
                Self::StreamWindow(StreamWindowPredicate::from_map(map)?)
            }
            PredicateType::Other(_) => Self::Opaque(map.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Presence helpers shared by the validators
// ---------------------------------------------------------------------------

fn is_present(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(|v| !v.is_null())
}

/// Looks up a required nested object. Records an error and returns `None`
/// if it is missing or not an object.
pub(crate) fn require_object<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
    owner: &str,
    errors: &mut Vec<String>,
) -> Option<&'a Map<String, Value>> {
    match parent.get(key) {
        None | Some(Value::Null) => {
            errors.push(format!("{owner} missing '{key}' field"));
            None
        }
        Some(Value::Object(obj)) => Some(obj),
        Some(_) => {
            errors.push(format!("{owner} field '{key}' must be an object"));
            None
        }
    }
}

/// Records an error for every key in `keys` absent from `obj`.
pub(crate) fn require_keys(
    obj: &Map<String, Value>,
    keys: &[&str],
    owner: &str,
    errors: &mut Vec<String>,
) {
    for key in keys {
        if !is_present(obj, key) {
            errors.push(format!("{owner} missing '{key}' field"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_predicate_type_has_no_errors() {
        let t = PredicateType::from_uri("https://example.com/unknown/v1");
        assert!(validate(&t, &Map::new()).is_empty());
    }

    #[test]
    fn null_counts_as_missing() {
        let obj = json!({"id": null}).as_object().unwrap().clone();
        let mut errors = Vec::new();
        require_keys(&obj, &["id"], "Collector", &mut errors);
        assert_eq!(errors, vec!["Collector missing 'id' field"]);
    }

    #[test]
    fn non_object_nested_field_is_reported() {
        let obj = json!({"collector": "c1"}).as_object().unwrap().clone();
        let mut errors = Vec::new();
        assert!(require_object(&obj, "collector", "Origin predicate", &mut errors).is_none());
        assert!(errors[0].contains("must be an object"));
    }
}

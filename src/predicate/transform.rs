//! Transform predicate: a computation that consumed inputs and produced the
//! statement's subjects.

use super::origin::Environment;
use super::{require_keys, require_object, PredicateBody};
use crate::digest::DigestSet;
use crate::statement::PredicateType;
use crate::verify::AssuranceLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub fn validate(predicate: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    match predicate.get("inputs") {
        None | Some(Value::Null) => {
            errors.push("Transform predicate missing 'inputs' field".to_string());
        }
        Some(Value::Array(inputs)) if inputs.is_empty() => {
            errors.push("Transform predicate has empty 'inputs' array".to_string());
        }
        Some(Value::Array(inputs)) => {
            for (i, input) in inputs.iter().enumerate() {
                match input.as_object() {
                    Some(obj) => {
                        require_keys(
                            obj,
                            &["name", "digest"],
                            &format!("Transform input {i}"),
                            &mut errors,
                        );
                        if obj
                            .get("name")
                            .is_some_and(|name| !name.is_null() && !name.is_string())
                        {
                            errors.push(format!(
                                "Transform input {i} field 'name' must be a string"
                            ));
                        }
                    }
                    None => errors.push(format!("Transform input {i} must be an object")),
                }
            }
        }
        Some(_) => errors.push("Transform predicate field 'inputs' must be an array".to_string()),
    }

    if let Some(t) = require_object(predicate, "transform", "Transform predicate", &mut errors) {
        require_keys(t, &["type", "name"], "Transform", &mut errors);
    }
    if let Some(e) = require_object(predicate, "executor", "Transform predicate", &mut errors) {
        require_keys(e, &["id"], "Executor", &mut errors);
    }

    errors
}

/// Digest-format errors for declared inputs. Inputs without a digest object
/// are left to [`validate`].
pub(crate) fn check_input_digests(predicate: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(inputs) = predicate.get("inputs").and_then(Value::as_array) else {
        return errors;
    };
    for (i, input) in inputs.iter().enumerate() {
        let Some(digest) = input.get("digest") else {
            continue;
        };
        match DigestSet::deserialize(digest) {
            Ok(set) if set.has_known_algorithm() => {}
            Ok(_) => errors.push(format!(
                "Transform input {i} digest has no sha256, sha384 or sha512 value"
            )),
            Err(e) => errors.push(format!("Transform input {i} has invalid digest: {e}")),
        }
    }
    errors
}

/// `(name, digest)` of every declared input with a string name, in order.
/// The digest is `None` when it is missing, malformed, or carries no known
/// algorithm; those inputs are still cross-checked by name.
pub(crate) fn declared_inputs(predicate: &Map<String, Value>) -> Vec<(String, Option<DigestSet>)> {
    predicate
        .get("inputs")
        .and_then(Value::as_array)
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(|input| {
                    let name = input.get("name")?.as_str()?;
                    let digest = input
                        .get("digest")
                        .and_then(|d| DigestSet::deserialize(d).ok())
                        .filter(DigestSet::has_known_algorithm);
                    Some((name.to_string(), digest))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    None,
    Process,
    Container,
    Vm,
    Hardware,
}

/// A dataset consumed by the transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformInput {
    pub name: String,
    pub digest: DigestSet,
    /// Where the attestation for this input can be found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_ref: Option<String>,
    /// Assurance level the input's own attestation reached.
    #[serde(default, rename = "makotoLevel", skip_serializing_if = "Option::is_none")]
    pub level: Option<AssuranceLevel>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl TransformInput {
    pub fn new(name: impl Into<String>, digest: DigestSet) -> Self {
        Self {
            name: name.into(),
            digest,
            attestation_ref: None,
            level: None,
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDefinition {
    /// URI identifying the kind of transform.
    #[serde(rename = "type")]
    pub transform_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationLevel>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformPredicate {
    pub inputs: Vec<TransformInput>,
    pub transform: TransformDefinition,
    pub executor: Executor,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl PredicateBody for TransformPredicate {
    const KIND: PredicateType = PredicateType::Transform;
}

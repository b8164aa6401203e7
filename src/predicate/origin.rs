//! Origin predicate: where a dataset came from and who collected it.

use super::{require_keys, require_object, PredicateBody};
use crate::statement::PredicateType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub fn validate(predicate: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(origin) = require_object(predicate, "origin", "Origin predicate", &mut errors) {
        require_keys(origin, &["source", "collectionTimestamp"], "Origin", &mut errors);
    }
    if let Some(collector) =
        require_object(predicate, "collector", "Origin predicate", &mut errors)
    {
        require_keys(collector, &["id"], "Collector", &mut errors);
    }

    errors
}

/// Kind of system the data was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Api,
    Database,
    File,
    Stream,
    Manual,
    Sensor,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionMethod {
    Pull,
    Push,
    ScheduledPull,
    EventDriven,
    BatchUpload,
    Streaming,
    Manual,
}

/// Deployment environment of a collector or executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
    Test,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    /// URI or identifier of the data source.
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub collection_timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_method: Option<CollectionMethod>,
    /// ISO 3166-1 code or cloud region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collector {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginPredicate {
    pub origin: Origin,
    pub collector: Collector,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl PredicateBody for OriginPredicate {
    const KIND: PredicateType = PredicateType::Origin;
}

//! Data Bill of Materials (DBOM): the lineage manifest of a finished dataset.
//!
//! A DBOM names the dataset, every source it was built from, and the ordered
//! transformations in between, each pointing at the attestation that backs
//! it. [`verify_dbom`] checks the manifest on its own; [`verify_dbom_with_chain`]
//! additionally runs [`verify_chain`] over the attestations and checks that
//! they describe the same lineage the manifest claims.

use crate::chain::verify_chain;
use crate::digest::{self, DigestMatch, DigestSet, HashAlgorithm};
use crate::error::{AttestError, Result};
use crate::policy::VerifierPolicy;
use crate::predicate::transform;
use crate::statement::{PredicateType, Statement};
use crate::verify::{AssuranceLevel, VerificationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use time::OffsetDateTime;
use tracing::debug;

pub const DBOM_VERSION: &str = "1.0.0";

/// Predicate type reported on DBOM results.
pub const DBOM_RESULT_TYPE: &str = "dbom";

/// Lineage manifest for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dbom {
    pub dbom_version: String,
    /// A URN, e.g. `urn:dbom:example.com:fraud-v1`.
    pub dbom_id: String,
    pub dataset: Dataset,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_graph: Option<LineageGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<DbomVerification>,
    /// `compliance`, `metadata` and anything else not modelled here.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Dbom {
    pub fn new(dbom_id: impl Into<String>, dataset: Dataset, sources: Vec<Source>) -> Self {
        Self {
            dbom_version: DBOM_VERSION.to_string(),
            dbom_id: dbom_id.into(),
            dataset,
            sources,
            transformations: Vec::new(),
            lineage_graph: None,
            verification: None,
            extensions: Map::new(),
        }
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    pub fn with_lineage_graph(mut self, graph: LineageGraph) -> Self {
        self.lineage_graph = Some(graph);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AttestError::Decode(format!("DBOM: {e}")))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AttestError::Encode(e.to_string()))
    }

    /// Transformations sorted by `order`.
    pub fn ordered_transformations(&self) -> Vec<&Transformation> {
        let mut steps: Vec<&Transformation> = self.transformations.iter().collect();
        steps.sort_by_key(|t| t.order);
        steps
    }

    /// Mermaid flowchart of sources, transformations, and the dataset.
    pub fn lineage_mermaid(&self) -> String {
        let mut out = String::from("graph LR\n");
        for step in self.ordered_transformations() {
            let node = format!("t{}", step.order);
            out.push_str(&format!("  {node}[\"{}\"]\n", step.name));
            for input in &step.inputs {
                out.push_str(&format!("  \"{input}\" --> {node}\n"));
            }
            for output in &step.outputs {
                out.push_str(&format!("  {node} --> \"{output}\"\n"));
            }
        }
        out
    }
}

/// The dataset the DBOM describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<OffsetDateTime>,
    pub digest: DatasetDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub makoto_level: Option<AssuranceLevel>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, digest: DatasetDigest) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            created: None,
            digest,
            makoto_level: None,
            extensions: Map::new(),
        }
    }

    pub fn with_level(mut self, level: AssuranceLevel) -> Self {
        self.makoto_level = Some(level);
        self
    }
}

/// Dataset digest plus descriptive size fields. Unlike a subject digest,
/// `sha256` is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDigest {
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<RecordCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl DatasetDigest {
    pub fn new(sha256: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
            sha512: None,
            record_count: None,
            format: None,
            size_bytes: None,
        }
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            size_bytes: Some(data.len() as u64),
            ..Self::new(digest::compute(HashAlgorithm::Sha256, data))
        }
    }

    /// The hash fields as a validated [`DigestSet`].
    pub fn digest_set(&self) -> Result<DigestSet> {
        let mut entries = vec![(HashAlgorithm::Sha256.id(), self.sha256.clone())];
        if let Some(sha512) = &self.sha512 {
            entries.push((HashAlgorithm::Sha512.id(), sha512.clone()));
        }
        DigestSet::new(entries)
    }
}

/// Record counts appear as integers or as strings such as `"~1M"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordCount {
    Exact(u64),
    Text(String),
}

/// A source dataset that feeds the lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_ref: Option<String>,
    /// Predicate type URI of the backing attestation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub makoto_level: Option<AssuranceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography: Option<String>,
    /// `consent`, `license`, `contribution`.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            attestation_ref: None,
            attestation_type: None,
            makoto_level: None,
            geography: None,
            extensions: Map::new(),
        }
    }

    pub fn attested_by(
        mut self,
        predicate_type: impl Into<PredicateType>,
        level: AssuranceLevel,
    ) -> Self {
        self.attestation_type = Some(predicate_type.into().to_string());
        self.makoto_level = Some(level);
        self
    }
}

/// One step of the lineage, consuming named datasets and producing others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub order: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub makoto_level: Option<AssuranceLevel>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_type: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Transformation {
    pub fn new<I, O>(order: u32, name: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            order,
            name: name.into(),
            description: None,
            attestation_ref: None,
            attestation_type: Some(PredicateType::Transform.to_string()),
            makoto_level: None,
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            transform_type: None,
            extensions: Map::new(),
        }
    }

    pub fn with_level(mut self, level: AssuranceLevel) -> Self {
        self.makoto_level = Some(level);
        self
    }

    fn label(&self) -> String {
        format!("Transformation {} ({})", self.order, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<LineageGraphFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineageGraphFormat {
    GraphvizDot,
    Mermaid,
    JsonLd,
    Cytoscape,
}

/// Verification summary a producer may embed in the DBOM. Informational:
/// [`verify_dbom_with_chain`] recomputes the facts instead of trusting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbomVerification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_signatures_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_count: Option<u32>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub verification_timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<VerifierInfo>,
}

impl DbomVerification {
    /// Summary of a [`verify_dbom_with_chain`] result over `attestations`
    /// statements.
    pub fn from_result(result: &VerificationResult, attestations: usize) -> Self {
        Self {
            chain_verified: Some(result.valid),
            all_signatures_valid: None,
            attestation_count: u32::try_from(attestations).ok(),
            verification_timestamp: Some(result.verified_at),
            verifier: Some(VerifierInfo {
                tool: Some(env!("CARGO_PKG_NAME").to_string()),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Structural and lineage checks on the manifest alone.
pub fn verify_dbom(dbom: &Dbom, _policy: &VerifierPolicy) -> VerificationResult {
    let (errors, warnings) = manifest_checks(dbom);
    let total = dbom.sources.len() + dbom.transformations.len();
    let verified = if errors.is_empty() { total } else { 0 };
    VerificationResult::conclude(
        Some(DBOM_RESULT_TYPE.to_string()),
        verified,
        total,
        errors,
        warnings,
    )
}

/// [`verify_dbom`], then [`verify_chain`] over `statements`, then a
/// cross-check that the statements attest what the manifest lists:
///
/// - each source is a subject of a statement of its declared type
/// - each transformation is backed by a transform statement emitting its
///   outputs and declaring exactly its inputs
/// - the dataset digest matches the statement that emits the dataset
///
/// Parts with no backing statement in the slice are warnings.
pub fn verify_dbom_with_chain(
    dbom: &Dbom,
    statements: &[Statement],
    policy: &VerifierPolicy,
) -> VerificationResult {
    let (mut errors, mut warnings) = manifest_checks(dbom);
    let chain = verify_chain(statements, policy);
    errors.extend(chain.errors);
    warnings.extend(chain.warnings);

    debug!(
        dbom = %dbom.dbom_id,
        statements = statements.len(),
        "cross-checking DBOM against attestations"
    );

    let mut emitted_by: HashMap<&str, usize> = HashMap::new();
    for (i, statement) in statements.iter().enumerate() {
        for subject in &statement.subjects {
            emitted_by.insert(subject.name.as_str(), i);
        }
    }

    for source in &dbom.sources {
        let Some(&i) = emitted_by.get(source.name.as_str()) else {
            warnings.push(format!("No attestation supplied for source {}", source.name));
            continue;
        };
        let actual = statements[i].predicate_type.as_str();
        if let Some(declared) = &source.attestation_type {
            if declared != actual {
                errors.push(format!(
                    "Source {} declared as {declared} but statement {i} is {actual}",
                    source.name
                ));
            }
        }
    }

    for step in dbom.ordered_transformations() {
        let Some(&i) = step.outputs.first().and_then(|o| emitted_by.get(o.as_str())) else {
            warnings.push(format!("No attestation supplied for {}", step.label()));
            continue;
        };
        let statement = &statements[i];
        if statement.predicate_type != PredicateType::Transform {
            errors.push(format!(
                "{} is backed by statement {i}, which is not a transform",
                step.label()
            ));
            continue;
        }
        let subjects: HashSet<&str> = statement.subjects.iter().map(|s| s.name.as_str()).collect();
        for output in &step.outputs {
            if !subjects.contains(output.as_str()) {
                errors.push(format!(
                    "{} output {output} is not a subject of statement {i}",
                    step.label()
                ));
            }
        }
        let declared: BTreeSet<String> = transform::declared_inputs(&statement.predicate)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let listed: BTreeSet<String> = step.inputs.iter().cloned().collect();
        if declared != listed {
            errors.push(format!(
                "{} inputs {listed:?} do not match statement {i} inputs {declared:?}",
                step.label()
            ));
        }
    }

    match emitted_by.get(dbom.dataset.name.as_str()) {
        None => warnings.push(format!(
            "No attestation supplied for dataset {}",
            dbom.dataset.name
        )),
        Some(&i) => {
            if let Ok(expected) = dbom.dataset.digest.digest_set() {
                let subject = statements[i]
                    .subjects
                    .iter()
                    .find(|s| s.name == dbom.dataset.name);
                if let Some(subject) = subject {
                    if !matches!(subject.digest.compare(&expected), DigestMatch::Match) {
                        errors.push(format!(
                            "Dataset {} digest does not match statement {i}",
                            dbom.dataset.name
                        ));
                    }
                }
            }
        }
    }

    let total = statements.len();
    let verified = if errors.is_empty() { total } else { 0 };
    VerificationResult::conclude(
        Some(DBOM_RESULT_TYPE.to_string()),
        verified,
        total,
        errors,
        warnings,
    )
}

fn manifest_checks(dbom: &Dbom) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if dbom.dbom_version != DBOM_VERSION {
        errors.push(format!("Unsupported DBOM version: {}", dbom.dbom_version));
    }
    if !dbom.dbom_id.starts_with("urn:") {
        errors.push(format!("DBOM ID must be a URN: {}", dbom.dbom_id));
    }
    if dbom.dataset.name.is_empty() {
        errors.push("Dataset has an empty name".to_string());
    }
    if let Err(e) = dbom.dataset.digest.digest_set() {
        errors.push(format!("Invalid dataset digest: {e}"));
    }

    if dbom.sources.is_empty() {
        errors.push("DBOM has no sources".to_string());
    }
    let mut available: HashSet<&str> = HashSet::new();
    for source in &dbom.sources {
        if !available.insert(source.name.as_str()) {
            errors.push(format!("Duplicate source name: {}", source.name));
        }
    }

    let mut orders = HashSet::new();
    for step in dbom.ordered_transformations() {
        if !orders.insert(step.order) {
            errors.push(format!("Duplicate transformation order: {}", step.order));
        }
        if step.inputs.is_empty() {
            errors.push(format!("{} has no inputs", step.label()));
        }
        if step.outputs.is_empty() {
            errors.push(format!("{} has no outputs", step.label()));
        }
        for input in &step.inputs {
            if !available.contains(input.as_str()) {
                errors.push(format!(
                    "{} input {input} is neither a source nor an earlier output",
                    step.label()
                ));
            }
        }
        available.extend(step.outputs.iter().map(String::as_str));
    }

    if !available.contains(dbom.dataset.name.as_str()) {
        warnings.push(format!(
            "Dataset {} is neither a source nor a transformation output",
            dbom.dataset.name
        ));
    }

    if let Some(claimed) = dbom.dataset.makoto_level {
        let parts = dbom
            .sources
            .iter()
            .map(|s| (format!("Source {}", s.name), s.makoto_level))
            .chain(
                dbom.transformations
                    .iter()
                    .map(|t| (t.label(), t.makoto_level)),
            );
        for (label, level) in parts {
            if let Some(level) = level.filter(|l| *l < claimed) {
                errors.push(format!(
                    "Dataset claims {claimed} but {label} only reached {level}"
                ));
            }
        }
    }

    (errors, warnings)
}

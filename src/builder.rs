//! Immutable drafts for assembling statements.
//!
//! Every `with_*` method consumes the draft and returns a new one, so a
//! partially configured draft can be cloned and branched without aliasing.
//! `build()` checks the invariants the statement must satisfy and produces
//! a [`Statement`].

use crate::digest::{DigestSet, HashAlgorithm};
use crate::error::{AttestError, Result};
use crate::merkle::{MerkleTree, MERKLE_ALGORITHM};
use crate::policy::VerifierPolicy;
use crate::predicate::origin::{
    CollectionMethod, Collector, Environment, Origin, OriginPredicate, SourceType,
};
use crate::predicate::stream_window::{
    Integrity, MerkleTreeInfo, Stream, StreamCollector, StreamWindowPredicate, TimeAlignment,
    Window, WindowChainLink, WindowType,
};
use crate::predicate::transform::{
    Executor, IsolationLevel, TransformDefinition, TransformInput, TransformPredicate,
};
use crate::predicate::PredicateBody;
use crate::statement::{Statement, Subject};
use crate::verify::AssuranceLevel;
use serde_json::{Map, Value};
use std::path::Path;
use time::OffsetDateTime;

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AttestError::Encode(format!("{} has no file name", path.display())))
}

fn sha256_of_file(path: &Path, policy: &VerifierPolicy) -> Result<DigestSet> {
    crate::digest::hash_file(path, &[HashAlgorithm::Sha256], policy.max_file_bytes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginDraft {
    pub source: String,
    pub collector_id: String,
    pub source_type: Option<SourceType>,
    pub collection_method: Option<CollectionMethod>,
    pub geography: Option<String>,
    pub environment: Option<Environment>,
    /// Defaults to the time of `build()`.
    pub collection_timestamp: Option<OffsetDateTime>,
}

impl OriginDraft {
    pub fn new(source: impl Into<String>, collector_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            collector_id: collector_id.into(),
            source_type: None,
            collection_method: None,
            geography: None,
            environment: None,
            collection_timestamp: None,
        }
    }

    pub fn with_source_type(self, source_type: SourceType) -> Self {
        Self {
            source_type: Some(source_type),
            ..self
        }
    }

    pub fn with_collection_method(self, method: CollectionMethod) -> Self {
        Self {
            collection_method: Some(method),
            ..self
        }
    }

    pub fn with_geography(self, geography: impl Into<String>) -> Self {
        Self {
            geography: Some(geography.into()),
            ..self
        }
    }

    pub fn with_environment(self, environment: Environment) -> Self {
        Self {
            environment: Some(environment),
            ..self
        }
    }

    pub fn with_collection_timestamp(self, at: OffsetDateTime) -> Self {
        Self {
            collection_timestamp: Some(at),
            ..self
        }
    }

    fn into_predicate(self) -> OriginPredicate {
        OriginPredicate {
            origin: Origin {
                source: self.source,
                collection_timestamp: self
                    .collection_timestamp
                    .unwrap_or_else(OffsetDateTime::now_utc),
                source_type: self.source_type,
                collection_method: self.collection_method,
                geography: self.geography,
                extensions: Map::new(),
            },
            collector: Collector {
                id: self.collector_id,
                environment: self.environment,
                extensions: Map::new(),
            },
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformDraft {
    pub transform_type: String,
    pub name: String,
    pub executor_id: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub environment: Option<Environment>,
    pub isolation: Option<IsolationLevel>,
    pub inputs: Vec<TransformInput>,
}

impl TransformDraft {
    pub fn new(
        transform_type: impl Into<String>,
        name: impl Into<String>,
        executor_id: impl Into<String>,
    ) -> Self {
        Self {
            transform_type: transform_type.into(),
            name: name.into(),
            executor_id: executor_id.into(),
            version: None,
            description: None,
            platform: None,
            environment: None,
            isolation: None,
            inputs: Vec::new(),
        }
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..self
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn with_platform(self, platform: impl Into<String>) -> Self {
        Self {
            platform: Some(platform.into()),
            ..self
        }
    }

    pub fn with_environment(self, environment: Environment) -> Self {
        Self {
            environment: Some(environment),
            ..self
        }
    }

    pub fn with_isolation(self, isolation: IsolationLevel) -> Self {
        Self {
            isolation: Some(isolation),
            ..self
        }
    }

    pub fn with_input(mut self, input: TransformInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Declares an input by name and digest, optionally pointing at the
    /// input's own attestation and the level it reached.
    pub fn with_input_digest(
        self,
        name: impl Into<String>,
        digest: DigestSet,
        attestation_ref: Option<String>,
        level: Option<AssuranceLevel>,
    ) -> Self {
        let input = TransformInput {
            attestation_ref,
            level,
            ..TransformInput::new(name, digest)
        };
        self.with_input(input)
    }

    /// Declares a file as an input, named after the file and digested with
    /// SHA-256.
    pub fn with_input_file(self, path: &Path, policy: &VerifierPolicy) -> Result<Self> {
        let digest = sha256_of_file(path, policy)?;
        Ok(self.with_input(TransformInput::new(file_name(path)?, digest)))
    }

    fn into_predicate(self) -> Result<TransformPredicate> {
        if self.inputs.is_empty() {
            return Err(AttestError::Encode("transform declares no inputs".into()));
        }
        Ok(TransformPredicate {
            inputs: self.inputs,
            transform: TransformDefinition {
                transform_type: self.transform_type,
                name: self.name,
                version: self.version,
                description: self.description,
                extensions: Map::new(),
            },
            executor: Executor {
                id: self.executor_id,
                platform: self.platform,
                environment: self.environment,
                isolation: self.isolation,
                extensions: Map::new(),
            },
            extensions: Map::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamWindowDraft {
    pub stream_id: String,
    pub source: String,
    pub window_type: WindowType,
    pub duration: String,
    pub collector_id: String,
    pub topic: Option<String>,
    pub alignment: Option<TimeAlignment>,
    pub merkle_tree: Option<MerkleTreeInfo>,
    pub chain: Option<WindowChainLink>,
}

impl StreamWindowDraft {
    pub fn new(
        stream_id: impl Into<String>,
        source: impl Into<String>,
        window_type: WindowType,
        duration: impl Into<String>,
        collector_id: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            source: source.into(),
            window_type,
            duration: duration.into(),
            collector_id: collector_id.into(),
            topic: None,
            alignment: None,
            merkle_tree: None,
            chain: None,
        }
    }

    pub fn with_topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..self
        }
    }

    pub fn with_alignment(self, alignment: TimeAlignment) -> Self {
        Self {
            alignment: Some(alignment),
            ..self
        }
    }

    /// Commits to a root computed elsewhere.
    pub fn with_merkle_root(
        self,
        algorithm: impl Into<String>,
        root: impl Into<String>,
        leaf_count: u64,
    ) -> Self {
        Self {
            merkle_tree: Some(MerkleTreeInfo {
                algorithm: algorithm.into(),
                leaf_count,
                root: root.into(),
                extensions: Map::new(),
            }),
            ..self
        }
    }

    /// Builds the window's Merkle tree from its records and commits to its
    /// root. A window needs at least one record to have a root.
    pub fn with_records<R: AsRef<[u8]>>(self, records: &[R]) -> Result<Self> {
        let tree = MerkleTree::from_records(records);
        let root = tree
            .root_hex()
            .ok_or_else(|| AttestError::Merkle("window has no records".into()))?;
        Ok(self.with_merkle_root(MERKLE_ALGORITHM, root, tree.leaf_count() as u64))
    }

    /// Links this window to the previous one on the same stream.
    pub fn with_previous_window(
        self,
        previous_window_id: impl Into<String>,
        previous_merkle_root: impl Into<String>,
    ) -> Self {
        let chain = WindowChainLink {
            previous_window_id: Some(previous_window_id.into()),
            previous_merkle_root: Some(previous_merkle_root.into()),
            ..self.chain.clone().unwrap_or_default()
        };
        Self {
            chain: Some(chain),
            ..self
        }
    }

    fn into_predicate(self) -> Result<StreamWindowPredicate> {
        let merkle_tree = self.merkle_tree.ok_or_else(|| {
            AttestError::Encode("stream window has no Merkle commitment".into())
        })?;
        Ok(StreamWindowPredicate {
            stream: Stream {
                id: self.stream_id,
                source: self.source,
                topic: self.topic,
                extensions: Map::new(),
            },
            window: Window {
                window_type: self.window_type,
                duration: self.duration,
                slide: None,
                alignment: self.alignment,
                watermark: None,
                extensions: Map::new(),
            },
            integrity: Integrity {
                merkle_tree,
                chain: self.chain,
                extensions: Map::new(),
            },
            collector: StreamCollector {
                id: self.collector_id,
                extensions: Map::new(),
            },
            extensions: Map::new(),
        })
    }
}

/// Predicate half of a statement draft.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateDraft {
    Origin(OriginDraft),
    Transform(TransformDraft),
    StreamWindow(StreamWindowDraft),
}

impl From<OriginDraft> for PredicateDraft {
    fn from(d: OriginDraft) -> Self {
        Self::Origin(d)
    }
}

impl From<TransformDraft> for PredicateDraft {
    fn from(d: TransformDraft) -> Self {
        Self::Transform(d)
    }
}

impl From<StreamWindowDraft> for PredicateDraft {
    fn from(d: StreamWindowDraft) -> Self {
        Self::StreamWindow(d)
    }
}

fn into_statement<P: PredicateBody>(subjects: Vec<Subject>, body: &P) -> Result<Statement> {
    Ok(Statement::new(subjects, P::KIND, body.to_map()?))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementDraft {
    pub subjects: Vec<Subject>,
    pub predicate: PredicateDraft,
}

impl StatementDraft {
    pub fn new(predicate: impl Into<PredicateDraft>) -> Self {
        Self {
            subjects: Vec::new(),
            predicate: predicate.into(),
        }
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Adds a subject whose SHA-256 is computed from `data`.
    pub fn with_subject_data(self, name: impl Into<String>, data: &[u8]) -> Self {
        let digest = DigestSet::of_bytes(data, &[HashAlgorithm::Sha256]);
        self.with_subject(Subject::new(name, digest))
    }

    /// Adds a file as a subject, named after the file.
    pub fn with_subject_file(self, path: &Path, policy: &VerifierPolicy) -> Result<Self> {
        let digest = sha256_of_file(path, policy)?;
        Ok(self.with_subject(Subject::new(file_name(path)?, digest)))
    }

    pub fn build(self) -> Result<Statement> {
        if self.subjects.is_empty() {
            return Err(AttestError::Encode("statement has no subjects".into()));
        }
        match self.predicate {
            PredicateDraft::Origin(d) => into_statement(self.subjects, &d.into_predicate()),
            PredicateDraft::Transform(d) => into_statement(self.subjects, &d.into_predicate()?),
            PredicateDraft::StreamWindow(d) => {
                into_statement(self.subjects, &d.into_predicate()?)
            }
        }
    }
}

/// Extension fields can be attached after building through the statement's
/// open predicate map.
pub fn with_predicate_field(mut statement: Statement, key: &str, value: Value) -> Statement {
    statement.predicate.insert(key.to_string(), value);
    statement
}

//! Single-Statement Verifier.
//!
//! Two linear phases. The structural phase runs the predicate validator and
//! the digest-format checks. The optional hash phase recomputes subject
//! digests from caller-supplied files, bytes, or precomputed digests.
//!
//! Failures never surface as `Err`: they accumulate as strings in
//! [`VerificationResult::errors`], and informational findings land in
//! [`VerificationResult::warnings`]. Only errors affect `valid`.

use crate::digest::{self, DigestMatch, DigestSet, HashAlgorithm};
use crate::error::AttestError;
use crate::policy::VerifierPolicy;
use crate::predicate::{self, stream_window, transform};
use crate::statement::{PredicateType, Statement, IN_TOTO_STATEMENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Ordinal trust tier of a verified attestation.
///
/// This module only ever assigns `L1`. `L2` comes from composing a valid
/// result with a successful signature check
/// ([`crate::signing::verify_signed`]); `L3` needs platform attestation that
/// is not modelled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssuranceLevel {
    /// The attestation exists and is structurally sound.
    L1,
    /// Additionally signed by a verified key.
    L2,
    /// Additionally produced on isolated, platform-attested infrastructure.
    L3,
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        })
    }
}

/// Outcome of verifying a statement or a chain of statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Predicate type URI, or `"chain"` for chain results.
    pub predicate_type: Option<String>,
    pub assurance_level: Option<AssuranceLevel>,
    pub subjects_verified: usize,
    pub subjects_total: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

impl VerificationResult {
    pub(crate) fn conclude(
        predicate_type: Option<String>,
        subjects_verified: usize,
        subjects_total: usize,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        let valid = errors.is_empty();
        Self {
            valid,
            predicate_type,
            assurance_level: valid.then_some(AssuranceLevel::L1),
            subjects_verified,
            subjects_total,
            errors,
            warnings,
            verified_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn all_subjects_verified(&self) -> bool {
        self.subjects_verified == self.subjects_total
    }

    /// Records an error found after the result was concluded.
    pub(crate) fn fail(&mut self, error: String) {
        self.errors.push(error);
        self.valid = false;
        self.assurance_level = None;
    }

    /// Raises the assurance level to `level`. Has no effect on an invalid
    /// result or when the current level is already at least `level`.
    pub fn elevate(&mut self, level: AssuranceLevel) {
        if self.valid && self.assurance_level.map_or(true, |cur| cur < level) {
            self.assurance_level = Some(level);
        }
    }
}

/// Where the hash phase gets the actual content of a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSource {
    /// Streamed from disk through the symlink and size guard.
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Digest already computed by the caller.
    Digest(DigestSet),
}

impl From<PathBuf> for SubjectSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<Vec<u8>> for SubjectSource {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<DigestSet> for SubjectSource {
    fn from(d: DigestSet) -> Self {
        Self::Digest(d)
    }
}

/// Structural phase only.
pub fn verify(statement: &Statement, policy: &VerifierPolicy) -> VerificationResult {
    let (errors, warnings) = structural_phase(statement, policy);
    VerificationResult::conclude(
        Some(statement.predicate_type.to_string()),
        0,
        statement.subjects.len(),
        errors,
        warnings,
    )
}

/// Structural phase followed by the hash phase over `sources`, keyed by
/// subject name. Subjects without a source are warned about, not failed.
pub fn verify_with_files(
    statement: &Statement,
    sources: &BTreeMap<String, SubjectSource>,
    policy: &VerifierPolicy,
) -> VerificationResult {
    let (mut errors, mut warnings) = structural_phase(statement, policy);
    let mut verified = 0;

    debug!(
        subjects = statement.subjects.len(),
        supplied = sources.len(),
        "hash phase"
    );
    for subject in &statement.subjects {
        let Some(source) = sources.get(&subject.name) else {
            warnings.push(format!("No file provided for subject: {}", subject.name));
            continue;
        };
        let algorithms = subject.digest.known_algorithms();
        if algorithms.is_empty() {
            // Already reported by the structural phase.
            continue;
        }
        let actual = match actual_digests(source, &algorithms, policy) {
            Ok(d) => d,
            Err(msg) => {
                errors.push(msg);
                continue;
            }
        };
        match subject.digest.compare(&actual) {
            DigestMatch::Match => {
                let missing: Vec<_> = algorithms
                    .iter()
                    .filter(|a| actual.get(**a).is_none())
                    .collect();
                if missing.is_empty() {
                    verified += 1;
                }
                for algorithm in missing {
                    errors.push(format!(
                        "Supplied digest lacks {algorithm} for {}",
                        subject.name
                    ));
                }
            }
            DigestMatch::Mismatch {
                algorithm,
                expected,
                actual,
            } => {
                warn!(subject = %subject.name, %algorithm, "subject hash mismatch");
                errors.push(format!(
                    "Hash mismatch for {}: expected {}, got {} ({algorithm})",
                    subject.name,
                    policy.display_digest(&expected),
                    policy.display_digest(&actual),
                ));
            }
            DigestMatch::Incomparable => errors.push(format!(
                "Cannot compare {}: supplied digest shares no algorithm with the subject",
                subject.name
            )),
        }
    }

    VerificationResult::conclude(
        Some(statement.predicate_type.to_string()),
        verified,
        statement.subjects.len(),
        errors,
        warnings,
    )
}

fn actual_digests(
    source: &SubjectSource,
    algorithms: &[HashAlgorithm],
    policy: &VerifierPolicy,
) -> Result<DigestSet, String> {
    match source {
        SubjectSource::Path(path) => {
            digest::hash_file(path, algorithms, policy.max_file_bytes).map_err(|e| match e {
                AttestError::Io { ref source, .. }
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    format!("File not found: {}", path.display())
                }
                other => format!("Failed to hash {}: {other}", path.display()),
            })
        }
        SubjectSource::Bytes(bytes) => Ok(DigestSet::of_bytes(bytes, algorithms)),
        SubjectSource::Digest(set) => Ok(set.clone()),
    }
}

fn structural_phase(statement: &Statement, policy: &VerifierPolicy) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let predicate_type = &statement.predicate_type;

    debug!(%predicate_type, subjects = statement.subjects.len(), "structural phase");

    if statement.statement_type != IN_TOTO_STATEMENT_TYPE {
        errors.push(format!(
            "Unexpected statement type: {}",
            statement.statement_type
        ));
    }
    if !predicate_type.is_known() {
        warnings.push(format!("Unknown predicate type: {predicate_type}"));
    }
    if statement.subjects.is_empty() {
        errors.push("Attestation has no subjects".to_string());
    }
    for (i, subject) in statement.subjects.iter().enumerate() {
        if !subject.digest.has_known_algorithm() {
            errors.push(format!(
                "Subject {i} ({}) has no sha256, sha384 or sha512 digest",
                subject.name
            ));
        }
    }

    errors.extend(predicate::validate(predicate_type, &statement.predicate));
    match predicate_type {
        PredicateType::Transform => {
            errors.extend(transform::check_input_digests(&statement.predicate));
        }
        PredicateType::StreamWindow if policy.require_merkle_root_format => {
            errors.extend(stream_window::check_root_formats(&statement.predicate));
        }
        _ => {}
    }

    (errors, warnings)
}

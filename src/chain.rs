//! Chain Verifier: single forward pass over an ordered lineage of statements.
//!
//! Each statement is verified on its own, then cross-checked against the
//! outputs of the statements *before* it:
//!
//! - a transform input whose name was emitted earlier must carry the same
//!   digest (error otherwise); an unseen name is only a warning, since inputs
//!   may be attested outside this slice of the chain
//! - a stream window that names a previous Merkle root must agree with the
//!   last earlier window on the same stream, with the same warning rule
//!
//! Both lookups are last-write-wins: a name (or stream id) re-emitted later in
//! the chain replaces the earlier entry.

use crate::digest::{DigestMatch, DigestSet};
use crate::policy::VerifierPolicy;
use crate::predicate::{stream_window, transform};
use crate::statement::{PredicateType, Statement};
use crate::verify::{self, VerificationResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Predicate type reported on chain results.
pub const CHAIN_PREDICATE_TYPE: &str = "chain";

pub fn verify_chain(statements: &[Statement], policy: &VerifierPolicy) -> VerificationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut known_outputs: HashMap<&str, &DigestSet> = HashMap::new();
    let mut window_roots: HashMap<String, String> = HashMap::new();

    debug!(statements = statements.len(), "verifying chain");

    for (i, statement) in statements.iter().enumerate() {
        let single = verify::verify(statement, policy);
        errors.extend(single.errors.iter().map(|e| format!("Statement {i}: {e}")));
        warnings.extend(single.warnings.iter().map(|w| format!("Statement {i}: {w}")));

        match statement.predicate_type {
            PredicateType::Transform => {
                for (name, digest) in transform::declared_inputs(&statement.predicate) {
                    match known_outputs.get(name.as_str()) {
                        Some(known) => match digest.as_ref().map(|d| known.compare(d)) {
                            Some(DigestMatch::Match) => {}
                            _ => {
                                warn!(position = i, input = %name, "chain integrity broken");
                                errors.push(format!(
                                    "Statement {i}: Input {name} hash mismatch with known output (chain integrity broken)"
                                ));
                            }
                        },
                        None => warnings.push(format!(
                            "Statement {i}: Input {name} not found in previous outputs"
                        )),
                    }
                }
            }
            PredicateType::StreamWindow => {
                if let Some(link) = stream_window::window_link(&statement.predicate) {
                    if let Some(prev) = &link.previous_root {
                        match window_roots.get(&link.stream_id) {
                            Some(root) if root == prev => {}
                            Some(_) => {
                                warn!(position = i, stream = %link.stream_id, "window chain broken");
                                errors.push(format!(
                                    "Statement {i}: Stream {} previous Merkle root does not match the preceding window (window chain broken)",
                                    link.stream_id
                                ));
                            }
                            None => warnings.push(format!(
                                "Statement {i}: Previous window for stream {} not found in chain",
                                link.stream_id
                            )),
                        }
                    }
                    if let Some(root) = link.root {
                        window_roots.insert(link.stream_id, root);
                    }
                }
            }
            _ => {}
        }

        for subject in &statement.subjects {
            if subject.digest.has_known_algorithm() {
                known_outputs.insert(subject.name.as_str(), &subject.digest);
            }
        }
    }

    let total = statements.len();
    let verified = if errors.is_empty() { total } else { 0 };
    VerificationResult::conclude(
        Some(CHAIN_PREDICATE_TYPE.to_string()),
        verified,
        total,
        errors,
        warnings,
    )
}

//! # Makoto -- verifiable attestation chains
//!
//! Canonical in-toto statements, DSSE envelopes, and chain-of-custody
//! verification for data provenance.
//!
//! A producer describes where data came from (`origin`), how it was derived
//! (`transform`), or which records a stream window held (`stream-window`),
//! binds that predicate to the digests of the data it covers, and signs the
//! canonical bytes. A consumer verifies each statement structurally, checks
//! subject digests against the data it holds, checks signatures, and walks
//! a lineage to confirm every transform consumed exactly what an earlier
//! statement produced.
//!
//! ## Security Properties
//!
//! - **`#![forbid(unsafe_code)]`**: No `unsafe` blocks anywhere.
//! - **Deterministic signing input**: [`statement::encode`] is a function of
//!   logical content only, and every signature covers
//!   [`envelope::pae`] of those bytes.
//! - **Strict digests**: only lowercase hex of the exact length is accepted;
//!   uppercase or truncated digests never reach signed bytes.
//! - **Defensive input handling**: all file I/O is symlink-checked and
//!   size-bounded via [`fs_guard`], and hashed in fixed-size chunks.
//! - **Pluggable crypto**: signing is an injected [`signing::Signer`]
//!   capability; the only backend shipped is Ed25519 (`ed25519-dalek`,
//!   `verify_strict`).
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`digest`] | Digest codec: validation and streaming SHA-256/384/512 |
//! | [`statement`] | in-toto Statement v1 model and canonical encoding |
//! | [`predicate`] | Predicate validators and typed predicate models |
//! | [`builder`] | Immutable drafts for assembling statements |
//! | [`envelope`] | DSSE envelope, PAE, seal/open |
//! | [`signing`] | Signer/verifier capabilities, Ed25519 backend, L2 composition |
//! | [`merkle`] | Merkle tree behind stream-window commitments |
//! | [`verify`] | Single-statement verifier |
//! | [`chain`] | Chain verifier |
//! | [`dbom`] | Data Bill of Materials and its lineage cross-check |
//! | [`document`] | JSON document type detection and routing |
//! | [`policy`] | Verifier configuration and secure defaults |
//! | [`fs_guard`] | Symlink-safe, size-bounded file access |
//!
//! ## Example
//!
//! ```
//! use makoto::builder::{OriginDraft, StatementDraft};
//! use makoto::policy::VerifierPolicy;
//! use makoto::signing::{sign_statement, verify_signed, Ed25519Signer};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> makoto::Result<()> {
//! let statement = StatementDraft::new(OriginDraft::new("https://api.example.com/data", "collector-1"))
//!     .with_subject_data("data.csv", b"id,value\n1,42\n")
//!     .build()?;
//!
//! let signer = Ed25519Signer::from_seed(&[7u8; 32]);
//! let signed = sign_statement(&statement, &signer)?;
//!
//! let result = verify_signed(
//!     &signed.envelope,
//!     &[&signer.verifier()],
//!     &BTreeMap::new(),
//!     &VerifierPolicy::default(),
//! )?;
//! assert!(result.valid);
//! assert_eq!(result.assurance_level, Some(makoto::AssuranceLevel::L2));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

/// Error taxonomy for operations that cannot produce a value.
pub mod error;

/// Symlink-safe, size-bounded file access. Single source of truth for all
/// untrusted file I/O.
pub mod fs_guard;

/// Verifier configuration: loads a JSON policy file and provides secure
/// defaults.
pub mod policy;

pub mod digest;

pub mod statement;

pub mod predicate;

pub mod builder;

pub mod envelope;

pub mod signing;

/// Merkle tree construction, inclusion proofs, and stream-window record
/// checks.
pub mod merkle;

pub mod verify;

pub mod chain;

pub mod dbom;

/// Detects envelopes, statements, and DBOMs in raw JSON.
pub mod document;

pub use chain::verify_chain;
pub use dbom::{verify_dbom, verify_dbom_with_chain, Dbom};
pub use digest::{DigestSet, HashAlgorithm};
pub use envelope::Envelope;
pub use error::{AttestError, Result};
pub use policy::VerifierPolicy;
pub use statement::{PredicateType, Statement, Subject};
pub use verify::{verify, verify_with_files, AssuranceLevel, SubjectSource, VerificationResult};

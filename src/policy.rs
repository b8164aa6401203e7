use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum policy file size (1 MB).
const MAX_POLICY_BYTES: u64 = 1024 * 1024;

/// Verifier configuration. Loaded from JSON; every field has a default so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierPolicy {
    /// Upper bound on any file hashed during the hash phase.
    pub max_file_bytes: u64,
    /// Hex characters of expected/actual digests shown in mismatch messages.
    /// Comparison always uses the full value.
    pub digest_display_chars: usize,
    /// Check that stream-window Merkle roots are well-formed hex for their
    /// declared algorithm.
    pub require_merkle_root_format: bool,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 512 * 1024 * 1024,
            digest_display_chars: 16,
            require_merkle_root_format: true,
        }
    }
}

impl VerifierPolicy {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let bytes = crate::fs_guard::read_validated(p, MAX_POLICY_BYTES)?;
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing verifier policy {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Shortens a digest for display according to `digest_display_chars`.
    pub(crate) fn display_digest<'a>(&self, value: &'a str) -> std::borrow::Cow<'a, str> {
        if value.len() > self.digest_display_chars {
            let cut = value
                .char_indices()
                .nth(self.digest_display_chars)
                .map_or(value.len(), |(i, _)| i);
            format!("{}...", &value[..cut]).into()
        } else {
            value.into()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_policy_values() {
        let policy = VerifierPolicy::default();
        assert_eq!(policy.max_file_bytes, 512 * 1024 * 1024);
        assert_eq!(policy.digest_display_chars, 16);
        assert!(policy.require_merkle_root_format);
    }

    #[test]
    fn test_load_none_returns_default() {
        let policy = VerifierPolicy::load(None).unwrap();
        assert_eq!(policy, VerifierPolicy::default());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"max_file_bytes": 4096, "future_knob": true}}"#).unwrap();

        let policy = VerifierPolicy::load(Some(f.path())).unwrap();
        assert_eq!(policy.max_file_bytes, 4096);
        assert_eq!(policy.digest_display_chars, 16);
        assert!(policy.require_merkle_root_format);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "not valid json").unwrap();

        let err = VerifierPolicy::load(Some(f.path())).unwrap_err();
        assert!(format!("{err:#}").contains("parsing verifier policy"));
    }

    #[test]
    fn test_load_nonexistent_file_fails() {
        let result = VerifierPolicy::load(Some(Path::new("/nonexistent/policy.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let big_file = dir.path().join("huge-policy.json");
        #[allow(clippy::cast_possible_truncation)]
        let data = vec![b' '; (MAX_POLICY_BYTES as usize) + 1];
        std::fs::write(&big_file, &data).unwrap();

        let err = VerifierPolicy::load(Some(&big_file)).unwrap_err().to_string();
        assert!(err.contains("too large"), "error should mention size: {err}");
    }

    #[test]
    fn test_display_digest_truncates() {
        let policy = VerifierPolicy::default();
        let full = "a".repeat(64);
        assert_eq!(policy.display_digest(&full), format!("{}...", "a".repeat(16)));
        assert_eq!(policy.display_digest("abcd"), "abcd");
    }
}

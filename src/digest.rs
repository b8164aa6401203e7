//! Digest Codec: canonical hex digests for SHA-256/384/512.
//!
//! Digests travel as lowercase hex strings keyed by algorithm name, exactly
//! as in-toto subjects carry them. Validation is strict: the value must be
//! lowercase hex of the exact length the algorithm produces. Uppercase hex is
//! rejected rather than normalised, so two encodings of one digest can never
//! both appear in signed bytes.
//!
//! Hashing is streaming: [`hash_reader`] feeds fixed [`CHUNK_SIZE`] blocks to
//! every requested algorithm in a single pass, so large files are never held
//! in memory.

use crate::error::{AttestError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::{collections::BTreeMap, fmt, io::Read, path::Path};

/// Read size used for streaming hashes.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hash algorithms the codec understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, weakest first.
    pub const ALL: [Self; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    /// Canonical key used in digest maps (e.g. `"sha256"`).
    pub fn id(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Length of a hex-encoded digest for this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Checks that `value` is lowercase hex of the exact length `algorithm` requires.
pub fn validate(algorithm: HashAlgorithm, value: &str) -> Result<()> {
    if value.len() != algorithm.hex_len() {
        return Err(AttestError::InvalidDigest {
            algorithm: algorithm.id().to_string(),
            reason: format!(
                "expected {} hex chars, got {}",
                algorithm.hex_len(),
                value.len()
            ),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
    {
        return Err(AttestError::InvalidDigest {
            algorithm: algorithm.id().to_string(),
            reason: format!("character {bad:?} is not lowercase hex"),
        });
    }
    Ok(())
}

/// Hashes `data` in one call and returns lowercase hex.
pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut h = Hasher::new(algorithm);
    h.update(data);
    h.finalize_hex()
}

/// Incremental hasher over one of the supported algorithms.
#[derive(Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Sha384(_) => HashAlgorithm::Sha384,
            Self::Sha512(_) => HashAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha384(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hasher({})", self.algorithm())
    }
}

/// Streams `reader` through every algorithm in `algorithms` using fixed-size
/// chunks. Returns the resulting digests and the number of bytes consumed.
pub fn hash_reader<R: Read>(
    mut reader: R,
    algorithms: &[HashAlgorithm],
) -> std::io::Result<(DigestSet, u64)> {
    let mut hashers: Vec<Hasher> = algorithms.iter().map(|a| Hasher::new(*a)).collect();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for h in &mut hashers {
            h.update(&buf[..n]);
        }
        total = total.saturating_add(n as u64);
    }
    let entries = hashers
        .into_iter()
        .map(|h| (h.algorithm().id().to_string(), h.finalize_hex()))
        .collect();
    Ok((DigestSet(entries), total))
}

/// Hashes a file (symlink-checked, size-bounded) with every algorithm in
/// `algorithms`. The file handle is released on every exit path.
pub fn hash_file(path: &Path, algorithms: &[HashAlgorithm], max_bytes: u64) -> Result<DigestSet> {
    let (f, _len) = crate::fs_guard::open_validated(path, max_bytes)?;
    hash_reader_bounded(f, algorithms, max_bytes).map_err(|source| AttestError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// [`hash_reader`] that stops after `max_bytes + 1` bytes and fails if the
/// reader yielded more than `max_bytes`. Covers files that grow after their
/// size was checked.
pub(crate) fn hash_reader_bounded<R: Read>(
    reader: R,
    algorithms: &[HashAlgorithm],
    max_bytes: u64,
) -> std::io::Result<DigestSet> {
    let (digests, total) = hash_reader(reader.take(max_bytes.saturating_add(1)), algorithms)?;
    if total > max_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file too large (read past max {max_bytes} bytes)"),
        ));
    }
    Ok(digests)
}

/// Outcome of comparing two digest sets over the algorithms they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestMatch {
    /// Every shared known algorithm agrees (and at least one is shared).
    Match,
    /// A shared algorithm disagrees.
    Mismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },
    /// No known algorithm appears in both sets.
    Incomparable,
}

/// Mapping from algorithm name to hex digest.
///
/// Known algorithms are validated when the set is constructed (including
/// when it is deserialized); unknown keys are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DigestSet(BTreeMap<String, String>);

impl DigestSet {
    /// Builds a set from `(algorithm, hex)` pairs, validating known algorithms.
    pub fn new<K, V, I>(entries: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::try_from(map)
    }

    /// A set holding a single digest.
    pub fn single(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self> {
        Self::new([(algorithm.id(), value.into())])
    }

    /// A set holding only a SHA-256 digest.
    pub fn sha256(value: impl Into<String>) -> Result<Self> {
        Self::single(HashAlgorithm::Sha256, value)
    }

    /// Hashes `data` with each algorithm in `algorithms`.
    pub fn of_bytes(data: &[u8], algorithms: &[HashAlgorithm]) -> Self {
        Self(
            algorithms
                .iter()
                .map(|a| (a.id().to_string(), compute(*a, data)))
                .collect(),
        )
    }

    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.0.get(algorithm.id()).map(String::as_str)
    }

    /// Looks up any key, known or not.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Known algorithms present in the set, in [`HashAlgorithm`] order.
    pub fn known(&self) -> impl Iterator<Item = (HashAlgorithm, &str)> + '_ {
        HashAlgorithm::ALL
            .into_iter()
            .filter_map(|a| self.get(a).map(|v| (a, v)))
    }

    pub fn known_algorithms(&self) -> Vec<HashAlgorithm> {
        self.known().map(|(a, _)| a).collect()
    }

    pub fn has_known_algorithm(&self) -> bool {
        self.known().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compares `self` (expected) against `actual` on every known algorithm
    /// both sets carry.
    pub fn compare(&self, actual: &DigestSet) -> DigestMatch {
        let mut shared = false;
        for (algorithm, expected) in self.known() {
            if let Some(found) = actual.get(algorithm) {
                shared = true;
                if expected != found {
                    return DigestMatch::Mismatch {
                        algorithm,
                        expected: expected.to_string(),
                        actual: found.to_string(),
                    };
                }
            }
        }
        if shared {
            DigestMatch::Match
        } else {
            DigestMatch::Incomparable
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for DigestSet {
    type Error = AttestError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        for (key, value) in &map {
            if let Some(algorithm) = HashAlgorithm::from_id(key) {
                validate(algorithm, value)?;
            }
        }
        Ok(Self(map))
    }
}

impl From<DigestSet> for BTreeMap<String, String> {
    fn from(set: DigestSet) -> Self {
        set.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_exact_lowercase_hex() {
        assert!(validate(HashAlgorithm::Sha256, &"a".repeat(64)).is_ok());
        assert!(validate(HashAlgorithm::Sha384, &"0".repeat(96)).is_ok());
        assert!(validate(HashAlgorithm::Sha512, &"f".repeat(128)).is_ok());
    }

    #[test]
    fn validate_rejects_short_value() {
        let err = validate(HashAlgorithm::Sha256, &"a".repeat(63)).unwrap_err();
        assert!(matches!(err, AttestError::InvalidDigest { .. }));
        assert!(err.to_string().contains("got 63"));
    }

    #[test]
    fn validate_rejects_uppercase() {
        assert!(validate(HashAlgorithm::Sha256, &"A".repeat(64)).is_err());
    }

    #[test]
    fn validate_rejects_non_hex() {
        assert!(validate(HashAlgorithm::Sha256, &"g".repeat(64)).is_err());
    }

    #[test]
    fn validate_rejects_length_of_other_algorithm() {
        assert!(validate(HashAlgorithm::Sha512, &"a".repeat(64)).is_err());
    }

    #[test]
    fn compute_known_vectors() {
        assert_eq!(
            compute(HashAlgorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(compute(HashAlgorithm::Sha384, b"hello").len(), 96);
        assert_eq!(compute(HashAlgorithm::Sha512, b"hello").len(), 128);
    }

    #[test]
    fn streaming_matches_one_shot_across_chunk_boundary() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let (set, n) = hash_reader(&data[..], &HashAlgorithm::ALL).unwrap();
        assert_eq!(n, data.len() as u64);
        for alg in HashAlgorithm::ALL {
            assert_eq!(set.get(alg).unwrap(), compute(alg, &data));
        }
    }

    #[test]
    fn digest_set_passes_unknown_keys_through() {
        let set = DigestSet::new([("sha256", "a".repeat(64)), ("gitCommit", "XYZ".to_string())])
            .unwrap();
        assert_eq!(set.get_raw("gitCommit"), Some("XYZ"));
        assert_eq!(set.known_algorithms(), vec![HashAlgorithm::Sha256]);
    }

    #[test]
    fn digest_set_rejects_bad_known_value_on_deserialize() {
        let res: std::result::Result<DigestSet, _> =
            serde_json::from_str(r#"{"sha256": "ABC"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn digest_set_unknown_only_has_no_known_algorithm() {
        let set: DigestSet = serde_json::from_str(r#"{"md5": "whatever"}"#).unwrap();
        assert!(!set.has_known_algorithm());
    }

    #[test]
    fn compare_over_shared_algorithms() {
        let a = DigestSet::new([("sha256", "a".repeat(64)), ("sha512", "b".repeat(128))]).unwrap();
        let same = DigestSet::sha256("a".repeat(64)).unwrap();
        let other = DigestSet::sha256("c".repeat(64)).unwrap();
        let disjoint = DigestSet::single(HashAlgorithm::Sha384, "d".repeat(96)).unwrap();

        assert_eq!(a.compare(&same), DigestMatch::Match);
        assert!(matches!(
            a.compare(&other),
            DigestMatch::Mismatch { algorithm: HashAlgorithm::Sha256, .. }
        ));
        assert_eq!(a.compare(&disjoint), DigestMatch::Incomparable);
    }

    #[test]
    fn hash_file_streams_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("data.bin");
        std::fs::write(&p, b"test data").unwrap();
        let set = hash_file(&p, &[HashAlgorithm::Sha256], 1024).unwrap();
        assert_eq!(
            set.get(HashAlgorithm::Sha256).unwrap(),
            compute(HashAlgorithm::Sha256, b"test data")
        );
        // Exactly at the cap is fine.
        assert!(hash_file(&p, &[HashAlgorithm::Sha256], 9).is_ok());
    }

    #[test]
    fn bounded_hash_refuses_reader_longer_than_cap() {
        // A reader that yields more than the stat said, as a growing file would.
        let data = vec![7u8; 32];
        let err = hash_reader_bounded(&data[..], &[HashAlgorithm::Sha256], 16).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("file too large"));

        let set = hash_reader_bounded(&data[..], &[HashAlgorithm::Sha256], 32).unwrap();
        assert_eq!(
            set.get(HashAlgorithm::Sha256).unwrap(),
            compute(HashAlgorithm::Sha256, &data)
        );
    }
}

use crate::error::{AttestError, Result};
use std::{
    fs::{self, File},
    io::{self, Read},
    path::Path,
};

fn io_err(path: &Path, source: io::Error) -> AttestError {
    AttestError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Stats `path` without following links and rejects symlinks and anything
/// larger than `max_bytes`. Returns the file length.
///
/// NOTE: narrow TOCTOU window between `symlink_metadata()` and the open that
/// follows. The check still catches accidental symlinks and oversized inputs.
fn check(path: &Path, max_bytes: u64) -> Result<u64> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(io_err(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "refusing to read symlink"),
        ));
    }
    if !meta.is_file() {
        return Err(io_err(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    if meta.len() > max_bytes {
        return Err(io_err(
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "file too large ({} bytes, max {max_bytes} bytes)",
                    meta.len()
                ),
            ),
        ));
    }
    Ok(meta.len())
}

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let (f, len) = open_validated(path, max_bytes)?;
    read_bounded(f, len, max_bytes).map_err(|e| io_err(path, e))
}

/// Reads at most `max_bytes + 1` bytes and fails if there were more than
/// `max_bytes`, so a file that grows after [`check`] is still refused.
fn read_bounded<R: Read>(reader: R, size_hint: u64, max_bytes: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(usize::try_from(size_hint).unwrap_or(0));
    reader.take(max_bytes.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("file too large (read past max {max_bytes} bytes)"),
        ));
    }
    Ok(buf)
}

/// Opens a file for streaming after the same symlink and size checks as
/// [`read_validated`]. The handle is closed when dropped, on every exit path.
pub fn open_validated(path: &Path, max_bytes: u64) -> Result<(File, u64)> {
    let len = check(path, max_bytes)?;
    let f = File::open(path).map_err(|e| io_err(path, e))?;
    Ok((f, len))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_small_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        assert_eq!(read_validated(f.path(), 16).unwrap(), b"hello");
    }

    #[test]
    fn rejects_oversized_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 32]).unwrap();
        let err = read_validated(f.path(), 31).unwrap_err().to_string();
        assert!(err.contains("too large"), "unexpected error: {err}");
    }

    #[test]
    fn bounded_read_refuses_reader_longer_than_cap() {
        let data = [1u8; 20];
        let err = read_bounded(&data[..], 10, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(read_bounded(&data[..], 20, 20).unwrap(), data);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = open_validated(Path::new("/nonexistent/makoto/file"), 1024).unwrap_err();
        match err {
            AttestError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.bin");
        std::fs::write(&real, b"data").unwrap();
        let link = dir.path().join("link.bin");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let err = open_validated(&link, 1024).unwrap_err().to_string();
        assert!(err.contains("symlink"), "unexpected error: {err}");
    }
}

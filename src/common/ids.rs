//! Content hashing for bundles, manifests and persisted documents.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{GovError, GovResult};

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, streamed in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> GovResult<String> {
    let file = File::open(path).map_err(|e| GovError::io("hash_open", path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|e| GovError::io("hash_read", path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Order-sensitive digest over named entries.
///
/// Each entry contributes `name \0 digest \n`, so the same set of files fed in
/// the same order always yields the same content hash.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, name: &str, digest_hex: &str) -> &mut Self {
        self.inner.update(name.as_bytes());
        self.inner.update([0u8]);
        self.inner.update(digest_hex.as_bytes());
        self.inner.update(b"\n");
        self
    }

    pub fn finish_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_and_slice_hashes_agree() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob");
        let payload = vec![7u8; 20_000];
        File::create(&path).unwrap().write_all(&payload).unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(&payload));
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_depends_on_names_and_order() {
        let mut a = ContentHasher::new();
        a.entry("model.bin", "aa").entry("metrics", "bb");
        let mut b = ContentHasher::new();
        b.entry("metrics", "bb").entry("model.bin", "aa");
        let mut c = ContentHasher::new();
        c.entry("model.bin", "aa").entry("metrics", "bb");
        let (a, b, c) = (a.finish_hex(), b.finish_hex(), c.finish_hex());
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = sha256_file(Path::new("/definitely/not/here")).unwrap_err();
        assert_eq!(err.kind(), crate::common::error::ErrorKind::Io);
    }
}

//! SHA-256 of files and of ordered source-hash manifests; binary-content
//! detector; CRLF normalization.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Reads the file streamingly and hashes it, returning `"sha256:<hex>"`.
pub fn compute_file_checksum(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Hashes a byte slice directly, for content already in memory (e.g.
/// position-extracted text before it is written to disk).
pub fn compute_bytes_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Hashes the concatenation of sorted `"path:hash\n"` lines over a manifest
/// of (path, hash) pairs, used by the internal-sync engine to derive a
/// deterministic "commit hash" for same-repo vendors.
pub fn compute_manifest_hash<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut lines: Vec<String> = entries.map(|(p, h)| format!("{p}:{h}\n")).collect();
    lines.sort();
    compute_bytes_checksum(lines.concat().as_bytes())
}

/// True iff any NUL byte appears in the first 8000 bytes — the common
/// heuristic used by diff tools.
pub fn is_binary_content(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(8000)];
    window.contains(&0u8)
}

/// Replaces every `"\r\n"` with `"\n"`.
pub fn normalize_crlf(s: &str) -> String {
    s.replace("\r\n", "\n")
}

use sha2::{Digest, Sha256};

use crate::version::Version;

/// Checksum of a declarative migration.
///
/// Statements are hashed after comment stripping, so editing a comment in
/// an applied script is not drift.
pub fn statements_checksum(apply: &[String], revert: Option<&[String]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"apply\0");
    for stmt in apply {
        hasher.update(stmt.as_bytes());
        hasher.update(b"\0");
    }
    if let Some(revert) = revert {
        hasher.update(b"revert\0");
        for stmt in revert {
            hasher.update(stmt.as_bytes());
            hasher.update(b"\0");
        }
    }
    hex::encode(hasher.finalize())
}

/// Checksum of a procedural migration; `fingerprint` is supplied by the
/// registering code (typically a hash or revision of the procedure source).
pub fn procedure_checksum(version: &Version, name: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"procedure\0");
    hasher.update(version.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

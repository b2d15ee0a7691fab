//! SHA-256 checksums of forward operations, used for drift detection.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 checksum of a string as lowercase hex
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checksum of a migration's forward SQL.
///
/// Line endings are normalised to `\n` and trailing whitespace at the end of
/// the script is ignored, so re-saving a file on another platform is not
/// reported as drift. Every other byte is significant.
pub fn forward_checksum(up_sql: &str) -> String {
    let normalized = up_sql.replace("\r\n", "\n");
    compute_checksum(normalized.trim_end())
}

#[cfg(test)]
#[path = "checksum_test.rs"]
mod tests;

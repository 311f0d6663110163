//! Checksums over migration SQL

use sha2::{Digest, Sha256};

use crate::migration::MigrationError;

/// Hex SHA-256 of the statements, separated by `;\n` so that moving text
/// between two statements still changes the hash.
pub fn calculate_checksum(statements: &[String]) -> String {
    let mut hasher = Sha256::new();
    for statement in statements {
        hasher.update(statement.trim().as_bytes());
        hasher.update(b";\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Compare a stored checksum with the current one.
pub fn validate_checksum(
    version: i64,
    name: &str,
    stored: &str,
    current: &str,
) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version,
            name: name.to_string(),
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}

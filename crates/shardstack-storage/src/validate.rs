//! Volume-name and object-path validation.
//!
//! Volume names follow the S3 bucket subset the storage layer accepts:
//! 3–63 bytes of lowercase letters, digits, `-` or `.`, starting and ending
//! with a letter or digit, with no `..` anywhere. Paths are forward-slash
//! separated, non-empty, with no `..` components, no embedded NUL, and no
//! leading or trailing separator.

use crate::error::{StorageError, StorageResult};

/// Minimum volume name length in bytes.
const MIN_VOLNAME_LEN: usize = 3;

/// Maximum volume name length in bytes.
const MAX_VOLNAME_LEN: usize = 63;

/// Validate a volume name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidVolumeName`] naming the violated rule.
///
/// # Examples
///
/// ```
/// use shardstack_storage::validate::check_volname;
///
/// assert!(check_volname("my-bucket").is_ok());
/// assert!(check_volname("No").is_err());
/// ```
pub fn check_volname(name: &str) -> StorageResult<()> {
    let fail = |reason: &str| StorageError::InvalidVolumeName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if !(MIN_VOLNAME_LEN..=MAX_VOLNAME_LEN).contains(&name.len()) {
        return Err(fail("must be between 3 and 63 bytes long"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(fail(
            "must only contain lowercase letters, digits, hyphens, and dots",
        ));
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(fail("must start and end with a letter or digit"));
    }
    if name.contains("..") {
        return Err(fail("must not contain '..'"));
    }

    Ok(())
}

/// Validate an object path.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] naming the violated rule.
pub fn check_path(path: &str) -> StorageResult<()> {
    let fail = |reason: &str| StorageError::InvalidPath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    if path.is_empty() {
        return Err(fail("must not be empty"));
    }
    if path.contains('\0') {
        return Err(fail("must not contain NUL"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(fail("must not start or end with '/'"));
    }
    if path.split('/').any(|c| c.is_empty() || c == "..") {
        return Err(fail("must not contain empty or '..' components"));
    }

    Ok(())
}

/// Validate an object prefix for listing.
///
/// A prefix follows the same rules as a path except that it may be empty
/// and may end with `/`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] naming the violated rule.
pub fn check_prefix(prefix: &str) -> StorageResult<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    check_path(prefix.strip_suffix('/').unwrap_or(prefix))
}

//! Path splitting.

use super::MAX_PATH_COMPONENTS;
use crate::error::{FsError, Result};

/// Split a slash-delimited path into its components.
///
/// The leading slash is optional; repeated and trailing slashes collapse.
/// An empty path or `"/"` yields no components. Paths with more than
/// [`MAX_PATH_COMPONENTS`] components are rejected.
pub fn split(path: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if parts.len() > MAX_PATH_COMPONENTS {
        return Err(FsError::InvalidPath);
    }
    Ok(parts)
}

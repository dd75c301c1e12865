//! Validation of client-controlled names before they reach a subprocess
//! argument or a filesystem path component.

use anyhow::{Result, bail};

const MAX_REF_LEN: usize = 250;

/// Validate a branch/tag/revision name taken from request input.
///
/// Stricter than git's own ref syntax: alphanumerics plus `-`, `_`, `.` and
/// `/` only, no component may be empty or start with `-` or `.`, and `..`
/// never appears. Anything else is rejected before argv or path use.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("ref name is empty");
    }
    if name.len() > MAX_REF_LEN {
        bail!("ref name exceeds {MAX_REF_LEN} bytes");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        bail!("ref name contains disallowed characters: {name:?}");
    }
    if name.contains("..") {
        bail!("ref name contains '..': {name:?}");
    }
    for component in name.split('/') {
        if component.is_empty() {
            bail!("ref name has an empty path component: {name:?}");
        }
        if component.starts_with('-') || component.starts_with('.') {
            bail!("ref name component starts with '-' or '.': {name:?}");
        }
    }
    Ok(())
}

/// Validate a repository path prefix extracted from the request path.
///
/// The prefix is joined onto the app root, so traversal components are
/// rejected outright.
pub fn validate_repo_prefix(prefix: &str) -> Result<()> {
    for component in prefix.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            bail!("repository path contains a traversal component: {prefix:?}");
        }
        if !component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            bail!("repository path contains disallowed characters: {prefix:?}");
        }
    }
    Ok(())
}

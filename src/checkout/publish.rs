//! Symlink publication: make a completed checkout reachable at
//! `/<entry>/<ref-name>/...` under the served hierarchy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::cache::Checkout;
use crate::validation::refname::validate_ref_name;

/// Create one relative symlink per top-level entry of the checkout:
/// `<app_root>/<entry>/<ref_name>` -> `<work_dir>/<entry>`.
///
/// Idempotent per (entry, ref name): an existing link pointing at the same
/// target is a no-op, and a stale link into the checkout cache (the ref
/// moved to a new commit) is atomically swapped for the new target. A link
/// pointing anywhere else was not published by us and is a reported
/// conflict, never silently overwritten.
pub async fn publish(app_root: &Path, checkout: &Checkout, ref_name: &str) -> Result<()> {
    validate_ref_name(ref_name)?;
    for entry in &checkout.entries {
        let link_path = app_root.join(entry).join(ref_name);
        let link_parent = link_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| app_root.join(entry));
        tokio::fs::create_dir_all(&link_parent).await.with_context(|| {
            format!("failed to create link directory {}", link_parent.display())
        })?;

        let target = relative_from(&checkout.work_dir.join(entry), &link_parent);
        match tokio::fs::symlink(&target, &link_path).await {
            Ok(()) => {
                checkout
                    .links
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(link_path.clone());
                tracing::debug!(
                    "published {} -> {}",
                    link_path.display(),
                    target.display()
                );
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = tokio::fs::read_link(&link_path).await.with_context(|| {
                    format!("existing entry at {} is not a symlink", link_path.display())
                })?;
                if existing == target {
                    continue;
                }
                if !is_cache_link(&existing, checkout, &link_parent) {
                    bail!(
                        "publication conflict at {}: points at {}, expected {}",
                        link_path.display(),
                        existing.display(),
                        target.display()
                    );
                }
                replace_link(&target, &link_path).await?;
                checkout
                    .links
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(link_path.clone());
                tracing::debug!(
                    "republished {} -> {} (was {})",
                    link_path.display(),
                    target.display(),
                    existing.display()
                );
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to create symlink {}", link_path.display())
                });
            }
        }
    }
    Ok(())
}

/// A link target counts as stale only when it points back into the checkout
/// cache; anything else was not published by this gateway and must not be
/// touched.
fn is_cache_link(existing: &Path, checkout: &Checkout, link_parent: &Path) -> bool {
    match checkout.work_dir.parent() {
        Some(cache_root) => existing.starts_with(relative_from(cache_root, link_parent)),
        None => false,
    }
}

/// Swap a published link to a new target without a window where the path is
/// absent: symlink at a staging name, then rename over the old link.
async fn replace_link(target: &Path, link_path: &Path) -> Result<()> {
    let name = link_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("link");
    let staging = link_path.with_file_name(format!(".{name}.swap-{}", std::process::id()));
    let _ = tokio::fs::remove_file(&staging).await;
    tokio::fs::symlink(target, &staging)
        .await
        .with_context(|| format!("failed to stage symlink {}", staging.display()))?;
    tokio::fs::rename(&staging, link_path)
        .await
        .with_context(|| format!("failed to replace symlink {}", link_path.display()))
}

/// Compute the path of `target` relative to the directory `base`.
/// Both are expected to be in the same absolute/relative form.
fn relative_from(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<_> = target.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    let mut common = 0;
    while common < target_parts.len()
        && common < base_parts.len()
        && target_parts[common] == base_parts[common]
    {
        common += 1;
    }
    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

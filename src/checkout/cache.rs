//! Checkout cache: one working tree per resolved commit id.
//!
//! A commit's tree is content-immutable, so a checkout runs at most once per
//! commit id. Directory creation is the on-disk concurrency control point
//! (atomic, so parallel processes cannot both win); within this process a
//! per-commit `OnceCell` additionally makes concurrent callers wait for the
//! winning task instead of racing past an in-progress checkout.
//!
//! The cache is bounded: beyond `max_checkouts` materialized commits the
//! least recently used checkout is evicted together with its published links.

use std::collections::HashMap;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use lru::LruCache;
use metrics::{counter, histogram};
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::validation::refname::validate_ref_name;

/// A materialized working tree for one commit.
#[derive(Debug)]
pub struct Checkout {
    pub commit_id: String,
    pub work_dir: PathBuf,
    /// Top-level entry names of the checked-out tree, sorted.
    pub entries: Vec<String>,
    /// Publication links created for this checkout, removed on eviction.
    pub(crate) links: Mutex<Vec<PathBuf>>,
}

pub struct CheckoutCache {
    git_binary: String,
    cache_root: PathBuf,
    timeout: Duration,
    inner: tokio::sync::Mutex<Inner>,
}

struct Inner {
    recent: LruCache<String, Arc<Checkout>>,
    inflight: HashMap<String, Arc<OnceCell<Arc<Checkout>>>>,
}

impl CheckoutCache {
    pub fn new(config: &Config) -> Result<Self> {
        let cache_root = config.cache_dir();
        std::fs::create_dir_all(&cache_root).with_context(|| {
            format!("failed to create cache directory {}", cache_root.display())
        })?;
        let capacity = NonZeroUsize::new(config.cache.max_checkouts.max(1))
            .expect("capacity is at least one");
        Ok(CheckoutCache {
            git_binary: config.git_binary.clone(),
            cache_root,
            timeout: Duration::from_millis(config.git.timeout_ms),
            inner: tokio::sync::Mutex::new(Inner {
                recent: LruCache::new(capacity),
                inflight: HashMap::new(),
            }),
        })
    }

    /// Resolve `ref_name` in `repo` to a commit id and make sure that
    /// commit's working tree exists under the cache root.
    ///
    /// Resolution runs on every call (refs move); the checkout itself runs
    /// at most once per commit id. Failures propagate as errors instead of
    /// degrading to the unresolved ref name.
    pub async fn ensure_checked_out(&self, repo: &Path, ref_name: &str) -> Result<Arc<Checkout>> {
        validate_ref_name(ref_name)?;
        let start = Instant::now();
        let commit_id = self.resolve_commit(repo, ref_name).await?;

        let cell = {
            let mut inner = self.inner.lock().await;
            if let Some(hit) = inner.recent.get(&commit_id) {
                return Ok(hit.clone());
            }
            inner
                .inflight
                .entry(commit_id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.materialize(repo, commit_id.clone()))
            .await
            .map(Arc::clone);

        let evicted = {
            let mut inner = self.inner.lock().await;
            inner.inflight.remove(&commit_id);
            match &result {
                Ok(checkout) => inner
                    .recent
                    .push(commit_id.clone(), checkout.clone())
                    .filter(|(id, _)| *id != commit_id),
                Err(_) => None,
            }
        };
        if let Some((_, victim)) = evicted {
            self.evict(victim).await;
        }

        histogram!("checkout.ensure_ms").record(start.elapsed().as_millis() as f64);
        result
    }

    async fn materialize(&self, repo: &Path, commit_id: String) -> Result<Arc<Checkout>> {
        let work_dir = self.cache_root.join(&commit_id);
        match tokio::fs::create_dir(&work_dir).await {
            Ok(()) => {
                if let Err(err) = self.run_checkout(repo, &commit_id, &work_dir).await {
                    // don't leave a partial tree poisoning later requests
                    let _ = tokio::fs::remove_dir_all(&work_dir).await;
                    return Err(err);
                }
                counter!("checkout.materialized").increment(1);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                // a previous run (or another process) owns this checkout
                tracing::debug!("checkout {commit_id} already materialized");
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to create work dir {}", work_dir.display())
                });
            }
        }

        let entries = list_top_level(&work_dir).await?;
        Ok(Arc::new(Checkout {
            commit_id,
            work_dir,
            entries,
            links: Mutex::new(Vec::new()),
        }))
    }

    async fn resolve_commit(&self, repo: &Path, ref_name: &str) -> Result<String> {
        let mut cmd = self.git(repo);
        cmd.args(["rev-list", "-n", "1"]).arg(ref_name);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("git rev-list timed out resolving {ref_name}"))?
            .with_context(|| format!("failed to run git rev-list for {ref_name}"))?;
        if !output.status.success() {
            bail!(
                "could not resolve ref {ref_name}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let commit_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if commit_id.len() != 40 || !commit_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("unexpected rev-list output for {ref_name}: {commit_id:?}");
        }
        Ok(commit_id)
    }

    async fn run_checkout(&self, repo: &Path, commit_id: &str, work_dir: &Path) -> Result<()> {
        let mut cmd = self.git(repo);
        cmd.arg("--work-tree")
            .arg(work_dir)
            .args(["checkout", "-f"])
            .arg(commit_id);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("git checkout of {commit_id} timed out"))?
            .with_context(|| format!("failed to run git checkout for {commit_id}"))?;
        if !output.status.success() {
            bail!(
                "checkout of {commit_id} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        // git narrates branch switches on stderr even on success
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!("git checkout: {}", stderr.trim());
        }
        Ok(())
    }

    fn git(&self, repo: &Path) -> Command {
        let mut cmd = Command::new(&self.git_binary);
        cmd.arg("--git-dir").arg(repo);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn evict(&self, victim: Arc<Checkout>) {
        let links: Vec<PathBuf> = {
            let mut links = victim.links.lock().unwrap_or_else(|e| e.into_inner());
            links.drain(..).collect()
        };
        for link in links {
            if let Err(err) = tokio::fs::remove_file(&link).await {
                tracing::warn!("failed to remove published link {}: {err}", link.display());
            }
        }
        if let Err(err) = tokio::fs::remove_dir_all(&victim.work_dir).await {
            tracing::warn!(
                "failed to remove evicted checkout {}: {err}",
                victim.work_dir.display()
            );
        }
        counter!("checkout.evicted").increment(1);
        tracing::info!("evicted checkout {}", victim.commit_id);
    }
}

async fn list_top_level(work_dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(work_dir)
        .await
        .with_context(|| format!("failed to list checkout {}", work_dir.display()))?;
    while let Some(entry) = dir
        .next_entry()
        .await
        .with_context(|| format!("failed to list checkout {}", work_dir.display()))?
    {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    entries.sort();
    Ok(entries)
}

//! Integration tests for the checkout cache and symlink publication.
//! These drive the real git binary against throwaway repositories.

use std::path::Path;
use std::sync::Arc;

use refgate::checkout::CheckoutCache;
use refgate::checkout::publish::publish;
use refgate::config::{CacheConfig, Config};
use refgate::test_helpers::{git, git_available, init_content_repo};
use tempfile::TempDir;

fn test_config(root: &Path) -> Config {
    Config {
        app_root: root.to_path_buf(),
        ..Config::default()
    }
}

#[tokio::test]
async fn resolves_ref_and_materializes_tree() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let checkout = cache
        .ensure_checked_out(&repo, "master")
        .await
        .expect("checkout master");
    assert_eq!(checkout.commit_id.len(), 40);
    assert!(checkout.work_dir.join("index.html").is_file());
    assert!(checkout.work_dir.join("assets/app.css").is_file());
    assert_eq!(checkout.entries, vec!["assets".to_string(), "index.html".to_string()]);
}

#[tokio::test]
async fn second_call_does_not_re_checkout() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let first = cache
        .ensure_checked_out(&repo, "master")
        .await
        .expect("first checkout");
    // a sentinel written into the work dir survives the second call, so the
    // tree was not checked out again
    std::fs::write(first.work_dir.join(".sentinel"), b"x").expect("write sentinel");

    let second = cache
        .ensure_checked_out(&repo, "master")
        .await
        .expect("second checkout");
    assert_eq!(second.commit_id, first.commit_id);
    assert!(first.work_dir.join(".sentinel").exists());
}

#[tokio::test]
async fn concurrent_callers_share_one_checkout() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let config = test_config(tmp.path());
    let cache = Arc::new(CheckoutCache::new(&config).expect("cache"));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let repo = repo.clone();
        tasks.spawn(async move { cache.ensure_checked_out(&repo, "master").await });
    }
    let mut commit_ids = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let checkout = joined.expect("task").expect("checkout");
        assert!(checkout.work_dir.join("index.html").is_file());
        commit_ids.push(checkout.commit_id.clone());
    }
    commit_ids.dedup();
    assert_eq!(commit_ids.len(), 1);

    // exactly one working directory was created
    let dirs = std::fs::read_dir(config.cache_dir()).expect("cache dir").count();
    assert_eq!(dirs, 1);
}

#[tokio::test]
async fn refs_pointing_at_the_same_commit_share_a_checkout() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let config = test_config(tmp.path());
    let cache = CheckoutCache::new(&config).expect("cache");

    let by_branch = cache.ensure_checked_out(&repo, "master").await.expect("master");
    let by_tag = cache.ensure_checked_out(&repo, "v1").await.expect("v1");
    assert_eq!(by_branch.commit_id, by_tag.commit_id);
    assert_eq!(by_branch.work_dir, by_tag.work_dir);

    let dirs = std::fs::read_dir(config.cache_dir()).expect("cache dir").count();
    assert_eq!(dirs, 1);
}

#[tokio::test]
async fn distinct_refs_get_distinct_checkouts() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let master = cache.ensure_checked_out(&repo, "master").await.expect("master");
    let feature = cache
        .ensure_checked_out(&repo, "feature-x")
        .await
        .expect("feature-x");
    assert_ne!(master.commit_id, feature.commit_id);
    assert_eq!(
        std::fs::read_to_string(feature.work_dir.join("index.html")).expect("read"),
        "<h1>feature</h1>\n"
    );
}

#[tokio::test]
async fn unresolvable_ref_is_an_error() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let err = cache
        .ensure_checked_out(&repo, "no-such-ref")
        .await
        .expect_err("must not resolve");
    assert!(err.to_string().contains("no-such-ref"));
}

#[tokio::test]
async fn hostile_ref_names_never_reach_git() {
    let tmp = TempDir::new().expect("tempdir");
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");
    // validation fails before any subprocess spawn, so no git needed here
    for name in ["--upload-pack=/bin/sh", "../../etc", "a;b"] {
        assert!(
            cache
                .ensure_checked_out(Path::new("/nonexistent"), name)
                .await
                .is_err(),
            "{name:?} must be rejected"
        );
    }
}

#[tokio::test]
async fn publish_links_are_relative_and_idempotent() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");
    let checkout = cache.ensure_checked_out(&repo, "master").await.expect("master");

    publish(tmp.path(), &checkout, "master").await.expect("publish");
    let link = tmp.path().join("index.html").join("master");
    let meta = std::fs::symlink_metadata(&link).expect("link exists");
    assert!(meta.file_type().is_symlink());
    let target = std::fs::read_link(&link).expect("read link");
    assert!(target.is_relative(), "link target must be relative: {target:?}");
    assert_eq!(
        std::fs::canonicalize(&link).expect("resolve link"),
        std::fs::canonicalize(checkout.work_dir.join("index.html")).expect("resolve target")
    );

    // publishing again is a no-op
    publish(tmp.path(), &checkout, "master").await.expect("republish");
}

#[tokio::test]
async fn publish_reports_conflicting_links() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");
    let checkout = cache.ensure_checked_out(&repo, "master").await.expect("master");

    let entry_dir = tmp.path().join("index.html");
    std::fs::create_dir_all(&entry_dir).expect("entry dir");
    std::os::unix::fs::symlink("somewhere-else", entry_dir.join("master")).expect("stale link");

    let err = publish(tmp.path(), &checkout, "master")
        .await
        .expect_err("conflict must be reported");
    assert!(err.to_string().contains("conflict"), "{err:#}");
}

#[tokio::test]
async fn publish_replaces_stale_link_when_ref_moves() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let before = cache.ensure_checked_out(&repo, "master").await.expect("before");
    publish(tmp.path(), &before, "master").await.expect("publish before");

    // cache checkouts run against the repo's object store and detach HEAD;
    // reattach before advancing the branch
    let work = tmp.path().join("content");
    git(&work, &["checkout", "-f", "master"]);
    std::fs::write(work.join("index.html"), "<h1>moved</h1>\n").expect("update");
    git(&work, &["commit", "-am", "move master"]);

    let after = cache.ensure_checked_out(&repo, "master").await.expect("after");
    publish(tmp.path(), &after, "master")
        .await
        .expect("republish after the ref moved");

    let link = tmp.path().join("index.html").join("master");
    assert_eq!(
        std::fs::canonicalize(&link).expect("resolve link"),
        std::fs::canonicalize(after.work_dir.join("index.html")).expect("resolve target")
    );
}

#[tokio::test]
async fn lru_eviction_removes_checkout_and_links() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let config = Config {
        cache: CacheConfig {
            dir: None,
            max_checkouts: 1,
        },
        ..test_config(tmp.path())
    };
    let cache = CheckoutCache::new(&config).expect("cache");

    let master = cache.ensure_checked_out(&repo, "master").await.expect("master");
    publish(tmp.path(), &master, "master").await.expect("publish master");
    assert!(tmp.path().join("index.html/master").exists());

    // capacity 1: materializing the feature branch evicts master
    let feature = cache
        .ensure_checked_out(&repo, "feature-x")
        .await
        .expect("feature-x");
    assert!(feature.work_dir.is_dir());
    assert!(!master.work_dir.exists(), "evicted work dir must be removed");
    assert!(
        std::fs::symlink_metadata(tmp.path().join("index.html/master")).is_err(),
        "evicted publication link must be removed"
    );
}

#[tokio::test]
async fn moved_ref_resolves_to_new_commit() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = TempDir::new().expect("tempdir");
    let repo = init_content_repo(tmp.path());
    let cache = CheckoutCache::new(&test_config(tmp.path())).expect("cache");

    let before = cache.ensure_checked_out(&repo, "master").await.expect("before");

    // cache checkouts run against the repo's object store and detach HEAD;
    // reattach before advancing the branch
    let work = tmp.path().join("content");
    git(&work, &["checkout", "-f", "master"]);
    std::fs::write(work.join("index.html"), "<h1>updated</h1>\n").expect("update");
    git(&work, &["commit", "-am", "update content"]);

    let after = cache.ensure_checked_out(&repo, "master").await.expect("after");
    assert_ne!(before.commit_id, after.commit_id);
    assert_eq!(
        std::fs::read_to_string(after.work_dir.join("index.html")).expect("read"),
        "<h1>updated</h1>\n"
    );
}

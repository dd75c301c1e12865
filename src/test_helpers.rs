//! Fixtures for integration tests: throwaway git repositories built with the
//! system git binary.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Integration tests exercise the real git toolchain; skip when it is absent.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking with its stderr on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=refgate-test",
            "-c",
            "user.email=refgate-test@example.invalid",
        ])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Run git in `dir` and return its trimmed stdout, panicking with its
/// stderr on failure.
pub fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout)
        .expect("git stdout is utf-8")
        .trim()
        .to_string()
}

/// Create a content repository under `root` with a `master` branch
/// (index.html + assets/app.css) and a `feature-x` branch that rewrites
/// index.html. Returns the path of its `.git` directory.
pub fn init_content_repo(root: &Path) -> PathBuf {
    let work = root.join("content");
    std::fs::create_dir_all(work.join("assets")).expect("create work tree");
    std::fs::write(work.join("index.html"), "<h1>master</h1>\n").expect("write index.html");
    std::fs::write(work.join("assets/app.css"), "body { margin: 0 }\n").expect("write app.css");

    git(&work, &["init"]);
    git(&work, &["add", "-A"]);
    git(&work, &["commit", "-m", "initial content"]);
    git(&work, &["branch", "-M", "master"]);
    git(&work, &["tag", "v1"]);

    git(&work, &["checkout", "-b", "feature-x"]);
    std::fs::write(work.join("index.html"), "<h1>feature</h1>\n").expect("write index.html");
    git(&work, &["commit", "-am", "feature content"]);
    git(&work, &["checkout", "master"]);

    work.join(".git")
}

/// Bare-clone the content repository to `<root>/<name>` so it can be
/// addressed by a request path prefix.
pub fn bare_clone(root: &Path, repo: &Path, name: &str) -> PathBuf {
    let dest = root.join(name);
    let output = Command::new("git")
        .current_dir(root)
        .arg("clone")
        .arg("--bare")
        .arg(repo)
        .arg(&dest)
        .output()
        .expect("failed to run git clone");
    assert!(
        output.status.success(),
        "git clone --bare failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    dest
}

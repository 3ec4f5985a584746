//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run git in `repo_path` and return its trimmed stdout
pub fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Create a repository on `main` with one commit holding `README`
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init", "-b", "main"]);
    git(&repo_path, &["config", "user.name", "Test User"]);
    git(&repo_path, &["config", "user.email", "test@example.com"]);
    git(&repo_path, &["config", "core.autocrlf", "false"]);

    fs::write(repo_path.join("README"), "hello\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "Initial commit"]);

    (temp_dir, repo_path)
}

/// Write `files` and commit them
pub fn commit_files(repo_path: &Path, message: &str, files: &[(&str, &str)]) -> String {
    for (name, content) in files {
        let path = repo_path.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    git(repo_path, &["add", "-A"]);
    git(repo_path, &["commit", "-m", message]);
    git(repo_path, &["rev-parse", "HEAD"])
}

/// Unified diff changing the single line of `file` from `old` to `new`
pub fn change_line_patch(file: &str, old: &str, new: &str) -> String {
    format!(
        "--- a/{file}\n+++ b/{file}\n@@ -1 +1 @@\n-{old}\n+{new}\n"
    )
}

/// Unified diff creating `file` with one line
pub fn new_file_patch(file: &str, line: &str) -> String {
    format!(
        "--- /dev/null\n+++ b/{file}\n@@ -0,0 +1 @@\n+{line}\n"
    )
}

/// Write a quilt series below `debian/patches` plus a control file
pub fn write_series(repo_path: &Path, patches: &[(&str, String)]) {
    let patch_dir = repo_path.join("debian/patches");
    fs::create_dir_all(&patch_dir).unwrap();

    let mut series = String::new();
    for (name, content) in patches {
        series.push_str(name);
        series.push('\n');
        let path = patch_dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    fs::write(patch_dir.join("series"), series).unwrap();
    fs::write(
        repo_path.join("debian/control"),
        "Source: hello\nMaintainer: Package Maintainer <maint@example.org>\n",
    )
    .unwrap();
}

/// Commit a quilt series below `debian/patches`
pub fn commit_series(repo_path: &Path, patches: &[(&str, String)]) -> String {
    write_series(repo_path, patches);
    commit_files(repo_path, "Add packaging", &[])
}

pub fn current_branch(repo_path: &Path) -> String {
    git(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn branches(repo_path: &Path) -> Vec<String> {
    git(repo_path, &["for-each-ref", "--format=%(refname:short)", "refs/heads/"])
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn series_file(repo_path: &Path) -> PathBuf {
    repo_path.join("debian/patches/series")
}

/// Subjects of `range`, oldest first
pub fn subjects(repo_path: &Path, range: &str) -> Vec<String> {
    git(repo_path, &["log", "--reverse", "--format=%s", range])
        .lines()
        .map(str::to_string)
        .collect()
}

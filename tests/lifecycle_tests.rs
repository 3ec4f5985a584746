mod common;

use common::*;
use patchq::config::{config_file_for_repo, Settings, CONFIG_FILE};
use patchq::errors::{PqError, EXIT_NOTHING_TO_DO, EXIT_OK, EXIT_USAGE};
use patchq::git::GitRepository;
use patchq::metadata::{PackageMetadata, QuiltMetadata};
use patchq::pq::lifecycle::{apply_single, drop_pq, rebase_pq, switch_pq};
use patchq::pq::naming::DEFAULT_PQ_BRANCH_PATTERN;
use patchq::pq::{dispatch, import_quilt_patches, Action, BranchPattern, ImportOptions, Outcome, Patch, QueueContext};
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn pattern() -> BranchPattern {
    BranchPattern::new(DEFAULT_PQ_BRANCH_PATTERN, "main")
}

/// Repository with an imported two-patch queue, left on `main`
fn imported_repo() -> (TempDir, std::path::PathBuf) {
    let (temp_dir, repo_path) = create_test_repo();
    commit_series(
        &repo_path,
        &[
            ("fix-build.patch", new_file_patch("build.txt", "fixed")),
            ("fix-typo.patch", change_line_patch("README", "hello", "hello world")),
        ],
    );

    let repo = GitRepository::open(&repo_path).unwrap();
    let metadata = QuiltMetadata::new(repo.path().join("debian"));
    import_quilt_patches(
        &repo,
        &pattern(),
        &metadata,
        &ImportOptions::default(),
        metadata.maintainer().as_ref(),
    )
    .unwrap();
    git(&repo_path, &["checkout", "main"]);

    (temp_dir, repo_path)
}

/// Run the `pq` binary with an isolated home directory
fn run_pq(repo_path: &Path, home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pq"))
        .arg("--repo")
        .arg(repo_path)
        .args(args)
        .current_dir(repo_path)
        .env("HOME", home)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

#[test]
fn test_switch_toggles_between_branches() {
    let (_temp_dir, repo_path) = create_test_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    let branch = switch_pq(&repo, &pattern(), "main").unwrap();
    assert_eq!(branch, "patch-queue/main");
    assert_eq!(current_branch(&repo_path), "patch-queue/main");
    assert_eq!(
        git(&repo_path, &["rev-parse", "patch-queue/main"]),
        git(&repo_path, &["rev-parse", "main"])
    );

    let branch = switch_pq(&repo, &pattern(), "patch-queue/main").unwrap();
    assert_eq!(branch, "main");
    assert_eq!(current_branch(&repo_path), "main");
}

#[test]
fn test_drop() {
    let (_temp_dir, repo_path) = imported_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    let err = drop_pq(&repo, &pattern(), "patch-queue/main").unwrap_err();
    assert!(matches!(err, PqError::Branch(_)));

    assert!(drop_pq(&repo, &pattern(), "main").unwrap());
    assert_eq!(branches(&repo_path), vec!["main"]);
    assert!(!drop_pq(&repo, &pattern(), "main").unwrap());
}

#[test]
fn test_dispatch_drop_without_queue_is_nothing_to_do() {
    let (_temp_dir, repo_path) = create_test_repo();
    commit_series(&repo_path, &[]);
    let repo = GitRepository::open(&repo_path).unwrap();
    let mut metadata = QuiltMetadata::new(repo.path().join("debian"));

    let mut ctx = QueueContext::new(&repo, pattern(), &mut metadata, None);
    let outcome = dispatch(&mut ctx, Action::Drop).unwrap();
    assert!(matches!(outcome, Outcome::NothingToDo(_)));
    assert_eq!(outcome.exit_code(), EXIT_NOTHING_TO_DO);
}

#[test]
fn test_apply_single_patch_with_topic() {
    let (_temp_dir, repo_path) = create_test_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    let patch_dir = TempDir::new().unwrap();
    let patch_path = patch_dir.path().join("greeting.patch");
    fs::write(
        &patch_path,
        format!(
            "From: Jane Dev <jane@example.com>\nSubject: [PATCH] Add greeting\n\nSays hi.\n---\n{}",
            new_file_patch("greet.txt", "hi")
        ),
    )
    .unwrap();
    let patch = Patch::from_file(&patch_path).unwrap();

    let commit = apply_single(
        &repo,
        &pattern(),
        "main",
        &patch,
        Some("features".to_string()),
        None,
    )
    .unwrap();

    assert_eq!(current_branch(&repo_path), "patch-queue/main");
    assert_eq!(git(&repo_path, &["rev-parse", "patch-queue/main"]), commit);
    assert_eq!(
        git(&repo_path, &["log", "-1", "--format=%B", &commit]),
        "Add greeting\n\nSays hi.\n\nGbp-Pq: Topic features"
    );
    assert_eq!(
        git(&repo_path, &["log", "-1", "--format=%an <%ae>", &commit]),
        "Jane Dev <jane@example.com>"
    );
    assert_eq!(fs::read_to_string(repo_path.join("greet.txt")).unwrap(), "hi\n");
    // The series is left alone
    assert!(!repo_path.join("debian/patches/series").exists());
}

#[test]
fn test_rebase_onto_advanced_base() {
    let (_temp_dir, repo_path) = imported_repo();
    let tip = commit_files(&repo_path, "Packaging change", &[("debian/rules", "#!/usr/bin/make -f\n")]);
    let repo = GitRepository::open(&repo_path).unwrap();

    let base = rebase_pq(&repo, &pattern(), "main").unwrap();
    assert_eq!(base, "main");
    assert_eq!(current_branch(&repo_path), "patch-queue/main");
    assert_eq!(git(&repo_path, &["merge-base", "main", "patch-queue/main"]), tip);
    assert_eq!(
        subjects(&repo_path, "main..patch-queue/main"),
        vec!["fix-build", "fix-typo"]
    );
}

#[test]
fn test_rebase_conflict_is_reported() {
    let (_temp_dir, repo_path) = imported_repo();
    commit_files(&repo_path, "Change greeting", &[("README", "goodbye\n")]);
    git(&repo_path, &["checkout", "patch-queue/main"]);
    let repo = GitRepository::open(&repo_path).unwrap();

    let err = rebase_pq(&repo, &pattern(), "patch-queue/main").unwrap_err();
    assert!(matches!(err, PqError::Rebase(_)));
    git(&repo_path, &["rebase", "--abort"]);
}

#[test]
fn test_cli_exit_codes() {
    let (_temp_dir, repo_path) = create_test_repo();
    commit_series(&repo_path, &[]);
    let home = TempDir::new().unwrap();

    let output = run_pq(&repo_path, home.path(), &["apply"]);
    assert_eq!(output.status.code(), Some(EXIT_USAGE as i32));

    let output = run_pq(&repo_path, home.path(), &["drop"]);
    assert_eq!(output.status.code(), Some(EXIT_NOTHING_TO_DO as i32));

    let output = run_pq(&repo_path, home.path(), &["switch"]);
    assert_eq!(output.status.code(), Some(EXIT_OK as i32));
    assert_eq!(current_branch(&repo_path), "patch-queue/main");

    // The queue is empty
    let output = run_pq(&repo_path, home.path(), &["export"]);
    assert_eq!(output.status.code(), Some(EXIT_NOTHING_TO_DO as i32));
    assert_eq!(current_branch(&repo_path), "main");
}

#[test]
fn test_cli_config_roundtrip() {
    let (_temp_dir, repo_path) = create_test_repo();
    let home = TempDir::new().unwrap();

    let output = run_pq(&repo_path, home.path(), &["config", "set", "import.tries", "3"]);
    assert_eq!(output.status.code(), Some(EXIT_OK as i32));

    let config_file = repo_path.join(".pq").join(CONFIG_FILE);
    let settings = Settings::load_from_file(&config_file).unwrap();
    assert_eq!(settings.import.tries, 3);

    let output = run_pq(&repo_path, home.path(), &["config", "get", "import.tries"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("import.tries = 3"));

    let output = run_pq(&repo_path, home.path(), &["config", "set", "import.tries", "0"]);
    assert_ne!(output.status.code(), Some(EXIT_OK as i32));
}

#[test]
#[serial]
fn test_user_config_is_used_without_repo_config() {
    let repo_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    let old_home = std::env::var_os("HOME");
    std::env::set_var("HOME", home.path());

    let user_file = home.path().join(".pq").join(CONFIG_FILE);
    let repo_file = repo_dir.path().join(".pq").join(CONFIG_FILE);
    assert_eq!(config_file_for_repo(repo_dir.path()), repo_file);

    Settings::default().save_to_file(&user_file).unwrap();
    assert_eq!(config_file_for_repo(repo_dir.path()), user_file);

    Settings::default().save_to_file(&repo_file).unwrap();
    assert_eq!(config_file_for_repo(repo_dir.path()), repo_file);

    match old_home {
        Some(value) => std::env::set_var("HOME", value),
        None => std::env::remove_var("HOME"),
    }
}

#[test]
fn test_failed_apply_returns_to_the_starting_branch() {
    let (_temp_dir, repo_path) = create_test_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    let patch_dir = TempDir::new().unwrap();
    let patch_path = patch_dir.path().join("broken.patch");
    fs::write(&patch_path, change_line_patch("README", "no such line", "x")).unwrap();
    let patch = Patch::from_file(&patch_path).unwrap();

    let err = apply_single(&repo, &pattern(), "main", &patch, None, None).unwrap_err();
    assert!(matches!(err, PqError::Apply { .. }));
    assert_eq!(current_branch(&repo_path), "main");
    assert_eq!(git(&repo_path, &["status", "--porcelain"]), "");
}

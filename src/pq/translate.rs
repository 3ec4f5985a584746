//! Conversion between commits and patches

use crate::errors::{PqError, Result};
use crate::git::{CommitInfo, GitRepository, Identity};
use crate::pq::series::Patch;
use crate::pq::trailers::{parse_trailers, topic_trailer};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Longest patch file name, topic directory included, before the extension
pub const MAX_PATCH_NAME_LEN: usize = 64 - ".patch".len();

/// Turn a subject line into something usable as a file name
pub fn sanitize_subject(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    let mut pending_dash = false;

    for c in subject.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    out.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Relative file name of a patch: `[topic/][NNNN-]<subject>.patch`
pub fn patch_filename(subject: &str, number: Option<usize>, topic: Option<&str>) -> String {
    let dir = topic.map(|t| format!("{}/", t)).unwrap_or_default();
    let prefix = number.map(|n| format!("{:04}-", n)).unwrap_or_default();

    let mut name = sanitize_subject(subject);
    if name.is_empty() {
        name = "patch".to_string();
    }

    let budget = MAX_PATCH_NAME_LEN.saturating_sub(dir.len() + prefix.len());
    if name.len() > budget {
        name.truncate(budget);
        name = name.trim_end_matches(['-', '.']).to_string();
    }

    format!("{}{}{}.patch", dir, prefix, name)
}

/// Whether `re` matches at the very beginning of `text`
fn matches_at_start(re: &Regex, text: &str) -> bool {
    re.find(text).is_some_and(|m| m.start() == 0)
}

/// A topic is used as a directory below the patch directory and must stay there
pub fn is_safe_topic(topic: &str) -> bool {
    let path = Path::new(topic);
    !topic.starts_with('/')
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// Describe a commit as a patch.
///
/// Returns `None` when the commit opts out, either through `ignore`
/// matching its subject or a body line, or through a `Gbp: Ignore` trailer.
/// The returned patch carries a path relative to the patch directory.
pub fn commit_to_patch(
    info: &CommitInfo,
    number: Option<usize>,
    ignore: Option<&Regex>,
    topic_regex: Option<&Regex>,
) -> Option<Patch> {
    if let Some(re) = ignore {
        if matches_at_start(re, &info.subject)
            || info.body.lines().any(|line| matches_at_start(re, line))
        {
            info!("Ignoring commit {} ({})", info.short_id(), info.subject);
            return None;
        }
    }

    let trailers = parse_trailers(&info.body, topic_regex);
    if trailers.ignore {
        info!("Ignoring commit {} ({}) as requested by its trailer", info.short_id(), info.subject);
        return None;
    }

    let topic = trailers.topic.filter(|topic| {
        let safe = is_safe_topic(topic);
        if !safe {
            warn!(
                "Ignoring topic '{}' of commit {}, it leaves the patch directory",
                topic,
                info.short_id()
            );
        }
        safe
    });

    let name = patch_filename(&info.subject, number, topic.as_deref());
    let patch = Patch {
        path: Some(PathBuf::from(name)),
        strip: None,
        topic,
        subject: info.subject.clone(),
        long_desc: trailers.body,
        author: Some(info.author.clone()),
    };
    Some(patch)
}

/// Write the patch for `commit_id` below `dir` at `patch.path`.
///
/// Files larger than a non-zero `compress_threshold` are gzipped and get a
/// `.gz` suffix. Returns the patch with its final absolute path, or `None`
/// when the commit changes nothing.
pub fn write_patch_file(
    repo: &GitRepository,
    commit_id: &str,
    patch: &Patch,
    dir: &Path,
    compress_threshold: u64,
) -> Result<Option<Patch>> {
    let relative = patch
        .path
        .as_ref()
        .ok_or_else(|| PqError::config(format!("Patch '{}' has no file name", patch.subject)))?;
    let out = dir.join(relative);

    let Some(written) = repo.format_patch(commit_id, &patch.subject, &patch.long_desc, &out)? else {
        return Ok(None);
    };

    let written = maybe_compress(&written, compress_threshold)?;
    Ok(Some(patch.clone().with_path(written)))
}

/// Gzip `path` in place if it is larger than `threshold` bytes
pub fn maybe_compress(path: &Path, threshold: u64) -> Result<PathBuf> {
    if threshold == 0 || fs::metadata(path)?.len() <= threshold {
        return Ok(path.to_path_buf());
    }

    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let content = fs::read(path)?;
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(File::create(&gz_path)?, Compression::best());
    encoder.write_all(&content)?;
    encoder.finish()?;
    fs::remove_file(path)?;

    debug!("Compressed {} ({} bytes)", gz_path.display(), content.len());
    Ok(gz_path)
}

/// Copy `src` to `dest`, decompressing it on the way
pub fn decompress_to(src: &Path, dest: &Path) -> Result<()> {
    let mut decoder = GzDecoder::new(File::open(src)?);
    let mut out = File::create(dest)?;
    io::copy(&mut decoder, &mut out)?;
    Ok(())
}

/// Commit message for a patch applied onto the queue
pub fn commit_message(patch: &Patch) -> String {
    let mut message = patch.subject.trim().to_string();
    let desc = patch.long_desc.trim_end();
    if !desc.is_empty() {
        message.push_str("\n\n");
        message.push_str(desc);
    }
    if let Some(topic) = patch.topic.as_deref() {
        message.push_str("\n\n");
        message.push_str(&topic_trailer(topic));
    }
    message.push('\n');
    message
}

/// Author to record for `patch`
fn resolve_author(repo: &GitRepository, patch: &Patch, fallback: Option<&Identity>) -> Result<Identity> {
    if patch.has_authorship() {
        if let Some(author) = patch.author.as_ref() {
            return Ok(author.clone());
        }
    }

    match fallback {
        Some(identity) => {
            warn!(
                "Patch '{}' has no authorship information, using '{}'",
                patch.display_name(),
                identity
            );
            Ok(patch
                .author
                .as_ref()
                .and_then(|a| a.date)
                .map(|date| identity.clone().with_date(date))
                .unwrap_or_else(|| identity.clone()))
        }
        None => {
            let sig = repo.signature()?;
            let identity = Identity::new(sig.name().unwrap_or(""), sig.email().unwrap_or(""));
            warn!(
                "Patch '{}' has no authorship information and no maintainer is known, using '{}'",
                patch.display_name(),
                identity
            );
            Ok(identity)
        }
    }
}

/// Apply `patch` to the checked out `branch` and record it as one commit.
///
/// The commit object is created first and `refs/heads/<branch>` is then
/// moved with a compare-and-swap against the head it was built on.
pub fn patch_to_commit(
    repo: &GitRepository,
    branch: &str,
    patch: &Patch,
    fallback: Option<&Identity>,
) -> Result<String> {
    let path = patch
        .path
        .as_ref()
        .ok_or_else(|| PqError::apply(patch.subject.clone(), "patch has no file"))?;

    let author = resolve_author(repo, patch, fallback)?;
    let old_head = repo.resolve_commit(branch)?.id();

    let _scratch;
    let apply_path = if patch.is_compressed() {
        let scratch = TempDir::new()?;
        let plain = scratch.path().join("patch");
        decompress_to(path, &plain)?;
        _scratch = scratch;
        plain
    } else {
        path.clone()
    };

    debug!("Applying {} with -p{}", path.display(), patch.strip_level());
    repo.apply_patch(&apply_path, patch.strip_level())
        .map_err(|e| match e {
            PqError::Apply { reason, .. } => PqError::apply(path.display().to_string(), reason),
            other => other,
        })?;

    let tree = repo.write_index_tree()?;
    let message = commit_message(patch);
    let committer = repo.signature()?;
    let commit = repo.commit_tree(tree, &message, &[old_head], &author.to_signature()?, &committer)?;

    repo.update_ref(
        &format!("refs/heads/{}", branch),
        commit,
        old_head,
        &format!("pq: apply {}", patch.display_name()),
    )?;

    debug!("Created commit {} for {}", commit, patch.display_name());
    Ok(commit.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::process::Command;

    fn info(subject: &str, body: &str) -> CommitInfo {
        CommitInfo {
            id: "0123456789abcdef0123456789abcdef01234567".to_string(),
            author: Identity::new("Jane Doe", "jane@example.com"),
            committer: Identity::new("Jane Doe", "jane@example.com"),
            subject: subject.to_string(),
            body: body.to_string(),
            tree: String::new(),
            parents: Vec::new(),
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {:?} failed", args);
    }

    fn create_test_repo() -> (TempDir, GitRepository) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path();
        git(path, &["init", "-b", "main"]);
        git(path, &["config", "user.name", "Test User"]);
        git(path, &["config", "user.email", "test@example.com"]);
        fs::write(path.join("README"), "hello\n").unwrap();
        git(path, &["add", "."]);
        git(path, &["commit", "-m", "Initial"]);
        let repo = GitRepository::open(path).unwrap();
        (temp_dir, repo)
    }

    #[test]
    fn test_sanitize_subject() {
        assert_eq!(sanitize_subject("Fix the build"), "Fix-the-build");
        assert_eq!(sanitize_subject("  [x] don't crash!  "), "x-don-t-crash");
        assert_eq!(sanitize_subject("v1.2_update..."), "v1.2_update");
        assert_eq!(sanitize_subject("***"), "");
    }

    #[test]
    fn test_patch_filename_numbering_and_topic() {
        assert_eq!(patch_filename("fix-build", Some(1), None), "0001-fix-build.patch");
        assert_eq!(patch_filename("fix-build", None, None), "fix-build.patch");
        assert_eq!(
            patch_filename("Fix it", Some(12), Some("upstream")),
            "upstream/0012-Fix-it.patch"
        );
    }

    #[test]
    fn test_patch_filename_is_truncated() {
        let subject = "a".repeat(200);
        let name = patch_filename(&subject, Some(3), Some("topic"));
        assert_eq!(name.len(), MAX_PATCH_NAME_LEN + ".patch".len());
        assert!(name.starts_with("topic/0003-aaa"));
        assert!(name.ends_with("a.patch"));
    }

    #[test]
    fn test_commit_to_patch_ignore_regex() {
        let ignore = Regex::new("^DO-NOT-EXPORT").unwrap();
        let commit = info("Ignore me", "Some text\nDO-NOT-EXPORT\n");
        assert!(commit_to_patch(&commit, Some(1), Some(&ignore), None).is_none());

        let commit = info("Keep me", "Some text\n");
        assert!(commit_to_patch(&commit, Some(1), Some(&ignore), None).is_some());
    }

    #[test]
    fn test_ignore_regex_only_matches_line_starts() {
        let ignore = Regex::new("Ignore").unwrap();
        let commit = info("Do not Ignore me", "Please keep Ignore out of it\n");
        assert!(commit_to_patch(&commit, Some(1), Some(&ignore), None).is_some());

        let commit = info("Ignore this one", "");
        assert!(commit_to_patch(&commit, Some(1), Some(&ignore), None).is_none());
    }

    #[test]
    fn test_topic_outside_patch_dir_is_dropped() {
        let commit = info("Sneaky", "Gbp-Pq: Topic ../escape\n");
        let patch = commit_to_patch(&commit, Some(1), None, None).unwrap();
        assert_eq!(patch.topic, None);
        assert_eq!(patch.path.unwrap(), PathBuf::from("0001-Sneaky.patch"));

        assert!(is_safe_topic("upstream/fixes"));
        assert!(!is_safe_topic("/etc"));
        assert!(!is_safe_topic("a/../../b"));
        assert!(!is_safe_topic("./x"));
    }

    #[test]
    fn test_commit_to_patch_trailers() {
        let commit = info("Fix build", "Details.\n\nGbp-Pq: Topic upstream\n");
        let patch = commit_to_patch(&commit, Some(2), None, None).unwrap();
        assert_eq!(patch.topic.as_deref(), Some("upstream"));
        assert_eq!(patch.path.unwrap(), PathBuf::from("upstream/0002-Fix-build.patch"));
        assert_eq!(patch.long_desc, "Details.\n");

        let commit = info("Local hack", "Gbp: Ignore\n");
        assert!(commit_to_patch(&commit, None, None, None).is_none());
    }

    #[test]
    fn test_commit_message_with_topic() {
        let mut patch = Patch::new("/tmp/x.patch").with_topic(Some("upstream".to_string()));
        patch.subject = "Fix build".to_string();
        patch.long_desc = "Because.\n".to_string();
        assert_eq!(
            commit_message(&patch),
            "Fix build\n\nBecause.\n\nGbp-Pq: Topic upstream\n"
        );
    }

    #[test]
    fn test_maybe_compress() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.patch");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert_eq!(maybe_compress(&path, 0).unwrap(), path);
        assert_eq!(maybe_compress(&path, 1000).unwrap(), path);

        let gz = maybe_compress(&path, 10).unwrap();
        assert_eq!(gz, dir.path().join("big.patch.gz"));
        assert!(!path.exists());

        let plain = dir.path().join("plain");
        decompress_to(&gz, &plain).unwrap();
        assert_eq!(fs::read_to_string(plain).unwrap(), "x".repeat(100));
    }

    #[test]
    fn test_patch_to_commit_uses_fallback_identity() {
        let (dir, repo) = create_test_repo();
        let patch_path = dir.path().join("greeting.patch");
        fs::write(
            &patch_path,
            "--- a/README\n+++ b/README\n@@ -1 +1 @@\n-hello\n+hello world\n",
        )
        .unwrap();

        let fallback = Identity::new("Maintainer", "maint@example.org");
        let patch = Patch::from_file(&patch_path).unwrap();
        let id = patch_to_commit(&repo, "main", &patch, Some(&fallback)).unwrap();

        let info = repo.get_commit_info(&id).unwrap();
        assert_eq!(info.subject, "greeting");
        assert_eq!(info.author.name, "Maintainer");
        assert_eq!(info.committer.name, "Test User");
        assert_eq!(repo.get_branch_head("main").unwrap(), id);
        assert_eq!(
            fs::read_to_string(dir.path().join("README")).unwrap(),
            "hello world\n"
        );
    }

    #[test]
    fn test_patch_to_commit_keeps_patch_author() {
        let (dir, repo) = create_test_repo();
        let patch_path = dir.path().join("0001-change.patch");
        fs::write(
            &patch_path,
            "From: Jane Doe <jane@example.com>\nDate: Tue, 1 Aug 2023 10:00:00 +0200\nSubject: [PATCH] Change greeting\n\nLonger text.\n---\n README | 2 +-\n\ndiff --git a/README b/README\n--- a/README\n+++ b/README\n@@ -1 +1 @@\n-hello\n+bye\n",
        )
        .unwrap();

        let patch = Patch::from_file(&patch_path).unwrap();
        let id = patch_to_commit(&repo, "main", &patch, None).unwrap();

        let info = repo.get_commit_info(&id).unwrap();
        assert_eq!(info.subject, "Change greeting");
        assert_eq!(info.body.trim(), "Longer text.");
        assert_eq!(info.author.email, "jane@example.com");
        assert_eq!(
            info.author.date,
            DateTime::parse_from_rfc2822("Tue, 1 Aug 2023 10:00:00 +0200").ok()
        );
    }

    #[test]
    fn test_patch_to_commit_reports_apply_failure() {
        let (dir, repo) = create_test_repo();
        let head = repo.get_branch_head("main").unwrap();
        let patch_path = dir.path().join("broken.patch");
        fs::write(
            &patch_path,
            "--- a/README\n+++ b/README\n@@ -1 +1 @@\n-something else\n+bye\n",
        )
        .unwrap();

        let patch = Patch::from_file(&patch_path).unwrap();
        let err = patch_to_commit(&repo, "main", &patch, None).unwrap_err();
        assert!(matches!(err, PqError::Apply { .. }));
        assert_eq!(repo.get_branch_head("main").unwrap(), head);
    }

    #[test]
    fn test_export_then_apply_roundtrip() {
        let (dir, repo) = create_test_repo();
        fs::write(dir.path().join("README"), "changed\n").unwrap();
        git(dir.path(), &["commit", "-am", "Change README", "-m", "Gbp-Pq: Topic docs"]);
        let id = repo.get_branch_head("main").unwrap();

        let commit = repo.get_commit_info(&id).unwrap();
        let patch = commit_to_patch(&commit, Some(1), None, None).unwrap();
        let out = TempDir::new().unwrap();
        let written = write_patch_file(&repo, &id, &patch, out.path(), 0)
            .unwrap()
            .unwrap();
        let path = written.path.unwrap();
        assert_eq!(path, out.path().join("docs/0001-Change-README.patch"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.starts_with("From "));
        assert!(content.contains("Subject: Change README"));
        assert!(!content.contains("Gbp-Pq"));

        let reread = Patch::from_file(&path).unwrap();
        assert_eq!(reread.subject, "Change README");
        assert_eq!(reread.author.unwrap().name, "Test User");
    }
}

use crate::errors::{PqError, Result};
use chrono::{DateTime, FixedOffset, TimeZone};
use git2::{BranchType, Oid, Repository, Signature, Time};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Name, email and optional timestamp of a commit author or committer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub date: Option<DateTime<FixedOffset>>,
}

impl Identity {
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Parse `Name <email>`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let open = value.rfind('<')?;
        let close = value[open..].find('>')? + open;
        let name = value[..open].trim().trim_matches('"');
        let email = value[open + 1..close].trim();
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some(Self::new(name, email))
    }

    fn from_signature(sig: &Signature<'_>) -> Self {
        let time = sig.when();
        let date = FixedOffset::east_opt(time.offset_minutes() * 60)
            .and_then(|tz| tz.timestamp_opt(time.seconds(), 0).single());
        Self {
            name: sig.name().unwrap_or("").to_string(),
            email: sig.email().unwrap_or("").to_string(),
            date,
        }
    }

    /// Convert into a git signature, stamped with the current time when no
    /// date is known
    pub fn to_signature(&self) -> Result<Signature<'static>> {
        let sig = match self.date {
            Some(date) => {
                let offset_minutes = date.offset().local_minus_utc() / 60;
                Signature::new(
                    &self.name,
                    &self.email,
                    &Time::new(date.timestamp(), offset_minutes),
                )?
            }
            None => Signature::now(&self.name, &self.email)?,
        };
        Ok(sig)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Read-only view of a single commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub author: Identity,
    pub committer: Identity,
    pub subject: String,
    pub body: String,
    pub tree: String,
    pub parents: Vec<String>,
}

impl CommitInfo {
    /// Abbreviated commit id
    pub fn short_id(&self) -> &str {
        &self.id[..7.min(self.id.len())]
    }
}

/// Wrapper around git2::Repository with the operations the patch queue needs
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| PqError::config(format!("Not a git repository: {}", e)))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| PqError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `.git` directory
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| PqError::branch(format!("Could not get HEAD: {}", e)))?;

        if !head.is_branch() {
            return Err(PqError::branch("Currently not on a branch"));
        }

        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| PqError::branch("Branch name is not valid UTF-8"))
    }

    /// Check if a branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Create a new branch pointing at `target`
    pub fn create_branch(&self, name: &str, target: &str) -> Result<()> {
        let target_commit = self.resolve_commit(target)?;

        self.repo
            .branch(name, &target_commit, false)
            .map_err(|e| PqError::branch(format!("Could not create branch '{}': {}", name, e)))?;

        debug!("Created branch '{}' at {}", name, target_commit.id());
        Ok(())
    }

    /// Switch to a branch
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| PqError::branch(format!("Could not find branch '{}': {}", name, e)))?;

        let tree = branch.get().peel_to_tree().map_err(|e| {
            PqError::branch(format!("Could not get tree for branch '{}': {}", name, e))
        })?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))
            .map_err(|e| PqError::branch(format!("Could not checkout branch '{}': {}", name, e)))?;

        self.repo
            .set_head(&format!("refs/heads/{}", name))
            .map_err(|e| PqError::branch(format!("Could not update HEAD to '{}': {}", name, e)))?;

        debug!("Switched to branch '{}'", name);
        Ok(())
    }

    /// Delete a local branch
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| PqError::branch(format!("Could not find branch '{}': {}", name, e)))?;

        branch
            .delete()
            .map_err(|e| PqError::branch(format!("Could not delete branch '{}': {}", name, e)))?;

        debug!("Deleted branch '{}'", name);
        Ok(())
    }

    /// Get the commit hash at the head of a branch
    pub fn get_branch_head(&self, branch_name: &str) -> Result<String> {
        let branch = self
            .repo
            .find_branch(branch_name, BranchType::Local)
            .map_err(|e| {
                PqError::branch(format!("Could not find branch '{}': {}", branch_name, e))
            })?;

        let commit = branch.get().peel_to_commit().map_err(|e| {
            PqError::branch(format!(
                "Could not get commit for branch '{}': {}",
                branch_name, e
            ))
        })?;

        Ok(commit.id().to_string())
    }

    /// Resolve any revision to the id of the object it names
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let obj = self
            .repo
            .revparse_single(rev)
            .map_err(|e| PqError::branch(format!("Could not resolve '{}': {}", rev, e)))?;
        Ok(obj.id().to_string())
    }

    /// Resolve a reference (branch name, tag, or commit hash) to a commit
    pub fn resolve_commit(&self, reference: &str) -> Result<git2::Commit<'_>> {
        let obj = self.repo.revparse_single(reference).map_err(|e| {
            PqError::branch(format!("Could not resolve reference '{}': {}", reference, e))
        })?;

        obj.peel_to_commit().map_err(|e| {
            PqError::branch(format!(
                "Reference '{}' does not point to a commit: {}",
                reference, e
            ))
        })
    }

    /// Whether `rev` names something that can be peeled to a tree
    pub fn has_treeish(&self, rev: &str) -> bool {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_tree())
            .is_ok()
    }

    /// Whether `rev` names something that can be peeled to a commit
    pub fn is_commitish(&self, rev: &str) -> bool {
        self.resolve_commit(rev).is_ok()
    }

    /// Commits reachable from `until` but not from `since`, newest first
    pub fn get_commits(
        &self,
        since: Option<&str>,
        until: &str,
        first_parent: bool,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let until_commit = self.resolve_commit(until)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        revwalk.push(until_commit.id())?;
        if let Some(since) = since {
            revwalk.hide(self.resolve_commit(since)?.id())?;
        }
        if first_parent {
            revwalk.simplify_first_parent()?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            if limit.is_some_and(|max| commits.len() >= max) {
                break;
            }
            commits.push(oid?.to_string());
        }

        Ok(commits)
    }

    /// Get author, committer and message details of a commit
    pub fn get_commit_info(&self, id: &str) -> Result<CommitInfo> {
        let commit = self.resolve_commit(id)?;
        let author = commit.author();
        let committer = commit.committer();

        let info = CommitInfo {
            id: commit.id().to_string(),
            author: Identity::from_signature(&author),
            committer: Identity::from_signature(&committer),
            subject: commit.summary().unwrap_or("").to_string(),
            body: commit.body().unwrap_or("").to_string(),
            tree: commit.tree_id().to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        };
        Ok(info)
    }

    /// Diff introduced by a commit against its first parent
    fn commit_diff(&self, commit: &git2::Commit<'_>) -> Result<git2::Diff<'_>> {
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit.tree()?), None)?;
        Ok(diff)
    }

    /// Write a single commit as a mail-formatted patch to `out_path`.
    ///
    /// `subject` and `body` replace the commit message so that callers can
    /// drop lines they consumed. The leading `From <sha> <date>` marker of the
    /// mbox format is not written. Returns `None` for commits that change
    /// nothing.
    pub fn format_patch(
        &self,
        commit_id: &str,
        subject: &str,
        body: &str,
        out_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let commit = self.resolve_commit(commit_id)?;
        let diff = self.commit_diff(&commit)?;
        if diff.deltas().count() == 0 {
            debug!("Commit {} is empty, not writing a patch", commit.id());
            return Ok(None);
        }

        let mut opts = git2::EmailCreateOptions::new();
        opts.subject_prefix("").omit_numbers(true);
        let email = git2::Email::from_diff(
            &diff,
            1,
            1,
            &commit.id(),
            subject,
            body,
            &commit.author(),
            &mut opts,
        )?;

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(out_path, strip_mbox_marker(email.as_slice()))?;

        debug!("Wrote {} for {}", out_path.display(), commit.id());
        Ok(Some(out_path.to_path_buf()))
    }

    /// Unified diff between two tree-ish revisions
    pub fn diff(&self, from: &str, to: &str) -> Result<String> {
        let from_tree = self.repo.revparse_single(from)?.peel_to_tree()?;
        let to_tree = self.repo.revparse_single(to)?.peel_to_tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?;

        let mut text = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            let origin = line.origin();
            if origin == '+' || origin == '-' || origin == ' ' {
                text.push(origin);
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(text)
    }

    /// Apply a patch file to the working tree and index
    pub fn apply_patch(&self, patch: &Path, strip: u32) -> Result<()> {
        let strip_arg = format!("-p{}", strip);
        let patch_arg = patch.to_string_lossy();
        let output = self.run_git(&[
            "apply",
            "--index",
            "--whitespace=nowarn",
            &strip_arg,
            &patch_arg,
        ])?;

        if !output.status.success() {
            return Err(PqError::apply(
                patch.display().to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        debug!("Applied {} ({})", patch.display(), strip_arg);
        Ok(())
    }

    /// Write the current index as a tree
    pub fn write_index_tree(&self) -> Result<Oid> {
        let mut index = self.repo.index()?;
        // `git apply --index` wrote the index behind our back
        index.read(true)?;
        Ok(index.write_tree()?)
    }

    /// Create a commit object without moving any reference
    pub fn commit_tree(
        &self,
        tree: Oid,
        message: &str,
        parents: &[Oid],
        author: &Signature<'_>,
        committer: &Signature<'_>,
    ) -> Result<Oid> {
        let tree = self.repo.find_tree(tree)?;
        let parents = parents
            .iter()
            .map(|id| self.repo.find_commit(*id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let id = self
            .repo
            .commit(None, author, committer, message, &tree, &parent_refs)?;
        Ok(id)
    }

    /// Move a reference to `new`, but only if it still points at `expected_old`
    pub fn update_ref(&self, refname: &str, new: Oid, expected_old: Oid, log: &str) -> Result<()> {
        self.repo
            .reference_matching(refname, new, true, expected_old, log)
            .map_err(|e| {
                PqError::branch(format!(
                    "Could not move '{}' from {} to {}: {}",
                    refname, expected_old, new, e
                ))
            })?;
        Ok(())
    }

    /// Best common ancestor of two revisions
    pub fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let a = self.resolve_commit(a)?.id();
        let b = self.resolve_commit(b)?.id();
        Ok(self.repo.merge_base(a, b)?.to_string())
    }

    /// Hard reset of HEAD, index and working tree
    pub fn reset_hard(&self, rev: &str) -> Result<()> {
        let commit = self.resolve_commit(rev)?;
        self.repo
            .reset(commit.as_object(), git2::ResetType::Hard, None)?;
        debug!("Hard reset to {}", commit.id());
        Ok(())
    }

    /// Rebase the current branch onto `upstream`
    pub fn rebase_onto(&self, upstream: &str) -> Result<()> {
        info!("Rebasing onto '{}'", upstream);
        let output = self.run_git(&["rebase", upstream])?;
        if !output.status.success() {
            return Err(PqError::rebase(format!(
                "git rebase {} failed: {}. Resolve the conflicts and run 'git rebase --continue'",
                upstream,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Whether `pathspec` has no staged, unstaged or untracked changes
    pub fn is_clean(&self, pathspec: &Path) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.pathspec(pathspec)
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    /// Stage every change below `pathspec` (including deletions) and commit it
    pub fn stage_and_commit(&self, pathspec: &Path, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        index.add_all([pathspec].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.update_all([pathspec].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = self.signature()?;
        let head = self.repo.head()?;
        let parent_commit = head.peel_to_commit()?;

        let commit_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent_commit],
        )?;

        info!("Created commit {}", commit_id);
        Ok(commit_id.to_string())
    }

    /// Get a signature for commits
    pub fn signature(&self) -> Result<Signature<'static>> {
        // Try to get signature from Git config
        if let Ok(config) = self.repo.config() {
            if let (Ok(name), Ok(email)) = (
                config.get_string("user.name"),
                config.get_string("user.email"),
            ) {
                return Ok(Signature::now(&name, &email)?);
            }
        }

        Ok(Signature::now("patchq", "patchq@localhost")?)
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        debug!("Running git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok(output)
    }
}

/// Drop the first line of an mbox message if it is a `From <sha> ...` marker
fn strip_mbox_marker(content: &[u8]) -> &[u8] {
    if content.starts_with(b"From ") {
        match content.iter().position(|b| *b == b'\n') {
            Some(pos) => &content[pos + 1..],
            None => &[],
        }
    } else {
        content
    }
}

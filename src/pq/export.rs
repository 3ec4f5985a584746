//! Regenerate a quilt series from a patch-queue branch
//!
//! Every commit between the baseline and the queue tip becomes one patch.
//! Patches are generated into a private directory first and only moved into
//! the patch directory once all of them were written.

use crate::config::{Settings, VERSION_PLACEHOLDER};
use crate::errors::{PqError, Result};
use crate::git::GitRepository;
use crate::metadata::{PackageMetadata, SeriesEntry};
use crate::pq::lifecycle::{drop_pq, restore_branch};
use crate::pq::naming::BranchPattern;
use crate::pq::series::{compare_series, relative_name, Patch, SeriesDiff};
use crate::pq::translate::{commit_to_patch, maybe_compress, sanitize_subject, write_patch_file};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for [`export_patches`]
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub patch_numbers: bool,
    pub ignore_regex: Option<Regex>,
    pub topic_regex: Option<Regex>,
    /// `<rev>[:<name>]`
    pub squash_until: Option<String>,
    pub export_rev: Option<String>,
    /// Tag of the upstream baseline, may contain `%(version)s`
    pub upstream_tag: Option<String>,
    pub compress_threshold: u64,
    pub commit: bool,
    pub drop: bool,
    /// Matches issue reference lines such as `Closes: #123`
    pub issue_refs: Regex,
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let export = &settings.export;
        let optional_regex = |pattern: Option<&str>| -> Result<Option<Regex>> {
            pattern
                .filter(|p| !p.is_empty())
                .map(Regex::new)
                .transpose()
                .map_err(PqError::from)
        };

        Ok(Self {
            patch_numbers: export.patch_numbers,
            ignore_regex: optional_regex(export.ignore_regex.as_deref())?,
            topic_regex: optional_regex(Some(export.topic_regex.as_str()))?,
            squash_until: export.squash_until.clone().filter(|s| !s.is_empty()),
            export_rev: export.export_rev.clone().filter(|s| !s.is_empty()),
            upstream_tag: settings.branches.upstream_tag.clone().filter(|s| !s.is_empty()),
            compress_threshold: export.compress_threshold,
            commit: export.commit,
            drop: export.drop,
            issue_refs: Regex::new(&format!(
                r"(?i)^\s*(?:{}):\s*{}",
                export.meta_closes, export.meta_closes_bugnum
            ))?,
        })
    }
}

/// What an export did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub base_branch: String,
    pub pq_branch: String,
    /// New series, relative to the patch directory
    pub patches: Vec<String>,
    pub diff: SeriesDiff,
    pub message: String,
    /// Commit recording the new patches, if one was made
    pub commit: Option<String>,
    pub dropped: bool,
}

impl ExportReport {
    /// Nothing was exported
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Split `<rev>[:<name>]`
fn parse_squash(value: &str) -> (&str, Option<&str>) {
    match value.split_once(':') {
        Some((rev, name)) if !name.is_empty() => (rev, Some(name)),
        Some((rev, _)) => (rev, None),
        None => (value, None),
    }
}

fn short(id: &str) -> &str {
    &id[..7.min(id.len())]
}

/// Commit message for the regenerated patch directory
pub fn synthesize_message(diff: &SeriesDiff, added: Option<&Patch>, issue_refs: &Regex) -> String {
    if let (1, 0, Some(patch)) = (diff.added.len(), diff.removed.len(), added) {
        let refs: Vec<&str> = patch
            .long_desc
            .lines()
            .filter(|line| issue_refs.is_match(line))
            .map(str::trim)
            .collect();
        let mut message = patch.subject.clone();
        if !refs.is_empty() {
            message.push_str("\n\n");
            message.push_str(&refs.join("\n"));
        }
        message.push('\n');
        return message;
    }

    let mut message = String::from("Rediff patches\n");
    if !diff.is_empty() {
        message.push('\n');
    }
    for name in &diff.added {
        message.push_str(&format!("Added {}: <REASON>\n", name));
    }
    for name in &diff.removed {
        message.push_str(&format!("Dropped {}: <REASON>\n", name));
    }
    message
}

/// Write the diff between two revisions, `None` if they do not differ
fn write_diff_file(
    repo: &GitRepository,
    from: &str,
    to: &str,
    path: &Path,
    compress_threshold: u64,
) -> Result<Option<PathBuf>> {
    let diff = repo.diff(from, to)?;
    if diff.is_empty() {
        debug!("Not writing empty diff {}", path.display());
        return Ok(None);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, diff)?;
    Ok(Some(maybe_compress(path, compress_threshold)?))
}

/// Commit the export baseline is relative to
fn resolve_baseline(
    repo: &GitRepository,
    metadata: &dyn PackageMetadata,
    opts: &ExportOptions,
    base_branch: &str,
    end_commit: &str,
) -> Result<String> {
    let baseline = match opts.upstream_tag.as_deref() {
        Some(template) if template.contains(VERSION_PLACEHOLDER) => {
            let version = metadata.upstream_version().ok_or_else(|| {
                PqError::config("Couldn't determine the upstream version for the upstream tag")
            })?;
            let tag = template.replace(VERSION_PLACEHOLDER, &version);
            repo.resolve_commit(&tag)
                .map_err(|_| {
                    PqError::branch(format!(
                        "Couldn't find upstream version {} ('{}'). Don't know on what base to export",
                        version, tag
                    ))
                })?
                .id()
                .to_string()
        }
        Some(tag) => repo.resolve_commit(tag)?.id().to_string(),
        None => repo.merge_base(base_branch, end_commit)?,
    };

    let end_id = repo.resolve_commit(end_commit)?.id().to_string();
    if repo.merge_base(&baseline, &end_id)? != baseline {
        return Err(PqError::branch(format!(
            "Start commit '{}' is not an ancestor of end commit '{}'",
            short(&baseline),
            end_commit
        )));
    }
    Ok(baseline)
}

/// Export the patch-queue branch of the current branch into the patch
/// directory described by `metadata`.
///
/// On error the branch that was checked out on entry is checked out again.
pub fn export_patches(
    repo: &GitRepository,
    pattern: &BranchPattern,
    metadata: &mut dyn PackageMetadata,
    opts: &ExportOptions,
) -> Result<ExportReport> {
    let current = repo.get_current_branch()?;
    let base_branch = if pattern.is_patch_queue(&current) {
        let base = pattern.patch_queue_base(&current).ok_or_else(|| {
            PqError::branch(format!("Couldn't determine the base branch of '{}'", current))
        })?;
        info!("On '{}', switching to '{}'", current, base);
        repo.checkout_branch(&base)?;
        base
    } else {
        current.clone()
    };

    export_from(repo, pattern, metadata, opts, base_branch).inspect_err(|_| {
        restore_branch(repo, &current);
    })
}

fn export_from(
    repo: &GitRepository,
    pattern: &BranchPattern,
    metadata: &mut dyn PackageMetadata,
    opts: &ExportOptions,
    base_branch: String,
) -> Result<ExportReport> {
    let pq_branch = pattern.patch_queue_name(&base_branch).ok_or_else(|| {
        PqError::branch(format!("'{}' is itself a patch-queue branch", base_branch))
    })?;

    let end = opts.export_rev.clone().unwrap_or_else(|| pq_branch.clone());
    if opts.export_rev.is_none() && !repo.branch_exists(&pq_branch) {
        return Err(PqError::branch(format!(
            "No patch-queue branch '{}' found, did you import the patches?",
            pq_branch
        )));
    }
    if !repo.has_treeish(&end) {
        return Err(PqError::branch(format!("'{}' is not a valid tree-ish", end)));
    }

    // A plain tree is diffed against the queue tip
    let end_commit = if repo.is_commitish(&end) {
        end.clone()
    } else {
        pq_branch.clone()
    };

    let mut start = resolve_baseline(repo, metadata, opts, &base_branch, &end_commit)?;
    info!("Generating patches from git ({}..{})", short(&start), end);

    let outdir = tempfile::Builder::new().prefix("pq-export-").tempdir()?;
    let mut generated: Vec<(PathBuf, Option<Patch>)> = Vec::new();

    if let Some(squash) = opts.squash_until.as_deref() {
        let (rev, name) = parse_squash(squash);
        let squash_id = repo.resolve_commit(rev)?.id().to_string();
        if squash_id != start {
            let in_range = repo.get_commits(Some(&start), &end_commit, false, None)?;
            if !in_range.contains(&squash_id) {
                return Err(PqError::branch(format!(
                    "Squash point '{}' not found in the history of '{}'",
                    rev, end_commit
                )));
            }

            let filename = match name {
                Some(name) => format!("{}.diff", name),
                None => format!("{}-to-{}.diff", short(&start), short(&squash_id)),
            };
            info!(
                "Squashing commits {}..{} into '{}'",
                short(&start),
                short(&squash_id),
                filename
            );
            if let Some(path) = write_diff_file(
                repo,
                &start,
                &squash_id,
                &outdir.path().join(&filename),
                opts.compress_threshold,
            )? {
                generated.push((path, None));
            }
            start = squash_id;
        }
    }

    let mut commits = repo.get_commits(Some(&start), &end_commit, false, None)?;
    commits.reverse();

    let mut number = 1;
    for commit in &commits {
        let commit_info = repo.get_commit_info(commit)?;
        let Some(patch) = commit_to_patch(
            &commit_info,
            opts.patch_numbers.then_some(number),
            opts.ignore_regex.as_ref(),
            opts.topic_regex.as_ref(),
        ) else {
            continue;
        };
        if opts.patch_numbers {
            number += 1;
        }

        if let Some(written) =
            write_patch_file(repo, commit, &patch, outdir.path(), opts.compress_threshold)?
        {
            if let Some(path) = written.path.clone() {
                generated.push((path, Some(written)));
            }
        }
    }

    if end_commit != end {
        let filename = format!("{}.diff", sanitize_subject(&end));
        info!("Generating '{}' ({}..{})", filename, end_commit, end);
        if let Some(path) = write_diff_file(
            repo,
            &end_commit,
            &end,
            &outdir.path().join(&filename),
            opts.compress_threshold,
        )? {
            generated.push((path, None));
        }
    }

    // Replace the engine-managed patches
    let old_entries = metadata.load_series()?;
    for entry in old_entries.iter().filter(|e| e.managed) {
        debug!("Removing '{}'", entry.filename);
        metadata.remove_managed_patch(&entry.filename)?;
    }

    let patch_dir = metadata.patch_dir();
    let mut new_names = Vec::with_capacity(generated.len());
    for (path, _) in &generated {
        let name = relative_name(path, outdir.path());
        let dest = patch_dir.join(&name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &dest)?;
        new_names.push(name);
    }

    let entries: Vec<SeriesEntry> = new_names
        .iter()
        .map(|name| SeriesEntry::new(name.clone(), None))
        .collect();
    metadata.declare_patches(&entries)?;
    metadata.save()?;

    let old_names: Vec<String> = old_entries.into_iter().map(|e| e.filename).collect();
    let diff = compare_series(&old_names, &new_names);
    let added_patch = diff.added.first().and_then(|added| {
        generated
            .iter()
            .zip(&new_names)
            .find(|(_, name)| *name == added)
            .and_then(|((_, patch), _)| patch.as_ref())
    });
    let message = synthesize_message(&diff, added_patch, &opts.issue_refs);

    if new_names.is_empty() {
        info!("No patches on '{}' - nothing to do", pq_branch);
    } else if diff.is_empty() {
        info!("No changes to the patch series");
    }

    let relative_patch_dir = patch_dir
        .strip_prefix(repo.path())
        .unwrap_or(&patch_dir)
        .to_path_buf();
    let mut commit = None;
    if opts.commit && !new_names.is_empty() {
        if repo.is_clean(&relative_patch_dir)? {
            info!("No changes to commit in '{}'", relative_patch_dir.display());
        } else {
            commit = Some(repo.stage_and_commit(&relative_patch_dir, &message)?);
        }
    } else if !opts.commit && !repo.is_clean(&relative_patch_dir)? {
        info!(
            "Patches in '{}' updated, review and commit them",
            relative_patch_dir.display()
        );
    }

    let mut dropped = false;
    if opts.drop {
        if repo.branch_exists(&pq_branch) {
            dropped = drop_pq(repo, pattern, &base_branch)?;
        } else {
            warn!("Not dropping '{}', it does not exist", pq_branch);
        }
    }

    Ok(ExportReport {
        base_branch,
        pq_branch,
        patches: new_names,
        diff,
        message,
        commit,
        dropped,
    })
}

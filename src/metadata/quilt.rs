//! Quilt style packaging metadata
//!
//! Patches live in `<packaging_dir>/patches` and are listed in
//! `<packaging_dir>/patches/series`. Every listed patch is considered
//! engine-managed; files in the patch directory that the series does not
//! mention are left alone.

use super::{PackageMetadata, SeriesEntry};
use crate::errors::Result;
use crate::git::Identity;
use crate::pq::series::{parse_series_line, Patch, PatchSeries};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct QuiltMetadata {
    packaging_dir: PathBuf,
    declared: Option<Vec<SeriesEntry>>,
}

impl QuiltMetadata {
    pub fn new<P: Into<PathBuf>>(packaging_dir: P) -> Self {
        Self {
            packaging_dir: packaging_dir.into(),
            declared: None,
        }
    }

    pub fn packaging_dir(&self) -> &Path {
        &self.packaging_dir
    }

    /// Value of the first `field:` line in the control file
    fn control_field(&self, field: &str) -> Option<String> {
        let content = fs::read_to_string(self.packaging_dir.join("control")).ok()?;
        content.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(field)
                .then(|| value.trim().to_string())
        })
    }
}

impl PackageMetadata for QuiltMetadata {
    fn series_file(&self) -> PathBuf {
        self.patch_dir().join("series")
    }

    fn patch_dir(&self) -> PathBuf {
        self.packaging_dir.join("patches")
    }

    fn load_series(&self) -> Result<Vec<SeriesEntry>> {
        let path = self.series_file();
        if !path.exists() {
            debug!("No series file at {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if let Some((filename, strip)) = parse_series_line(line, idx + 1, &path)? {
                entries.push(SeriesEntry::new(filename, strip));
            }
        }
        Ok(entries)
    }

    fn remove_managed_patch(&mut self, filename: &str) -> Result<()> {
        let patch_dir = self.patch_dir();
        let path = patch_dir.join(filename);
        if path.is_file() {
            fs::remove_file(&path)?;
            debug!("Removed {}", path.display());
        }

        // Drop topic directories that became empty
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == patch_dir || !current.starts_with(&patch_dir) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    fn declare_patches(&mut self, patches: &[SeriesEntry]) -> Result<()> {
        self.declared = Some(patches.to_vec());
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let Some(declared) = self.declared.as_ref() else {
            return Ok(());
        };

        let patch_dir = self.patch_dir();
        let mut series = PatchSeries::new();
        for entry in declared {
            series.append(Patch::new(patch_dir.join(&entry.filename)).with_strip(entry.strip))?;
        }
        series.write(&self.series_file())
    }

    fn maintainer(&self) -> Option<Identity> {
        self.control_field("Maintainer")
            .and_then(|value| Identity::parse(&value))
    }

    fn upstream_version(&self) -> Option<String> {
        let content = fs::read_to_string(self.packaging_dir.join("changelog")).ok()?;
        let first = content.lines().find(|l| !l.trim().is_empty())?;
        let open = first.find('(')?;
        let close = first[open..].find(')')? + open;
        Some(upstream_part(&first[open + 1..close]).to_string())
    }
}

/// Upstream part of a package version: epoch and packaging revision removed
fn upstream_part(version: &str) -> &str {
    let version = version.split_once(':').map_or(version, |(_, rest)| rest);
    version.rsplit_once('-').map_or(version, |(upstream, _)| upstream)
}

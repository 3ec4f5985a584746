pub mod quilt;

pub use quilt::QuiltMetadata;

use crate::errors::Result;
use crate::git::Identity;
use std::path::PathBuf;

/// One patch declared by the package metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    /// Path relative to the patch directory
    pub filename: String,
    pub strip: Option<u32>,
    /// Whether the engine created the file and may regenerate it
    pub managed: bool,
}

impl SeriesEntry {
    pub fn new<S: Into<String>>(filename: S, strip: Option<u32>) -> Self {
        Self {
            filename: filename.into(),
            strip,
            managed: true,
        }
    }
}

/// Package metadata that declares which patches a package carries
pub trait PackageMetadata {
    /// File listing the patches
    fn series_file(&self) -> PathBuf;

    /// Directory holding the patch files
    fn patch_dir(&self) -> PathBuf;

    /// Patches currently declared, in application order
    fn load_series(&self) -> Result<Vec<SeriesEntry>>;

    /// Delete an engine-managed patch file
    fn remove_managed_patch(&mut self, filename: &str) -> Result<()>;

    /// Replace the declared patches; written out by [`PackageMetadata::save`]
    fn declare_patches(&mut self, patches: &[SeriesEntry]) -> Result<()>;

    fn save(&mut self) -> Result<()>;

    /// Package maintainer, used when a patch carries no author
    fn maintainer(&self) -> Option<Identity>;

    /// Upstream version the packaging currently targets
    fn upstream_version(&self) -> Option<String>;
}

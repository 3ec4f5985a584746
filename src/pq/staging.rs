//! Private snapshot of a patch series
//!
//! Import may switch branches several times while it looks for a baseline,
//! which can change or remove the series in the working tree. Staging copies
//! the series and every patch it references into a temporary directory that
//! lives as long as the returned [`StagedSeries`].

use crate::errors::Result;
use crate::pq::series::{relative_name, PatchSeries};
use crate::pq::translate::decompress_to;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

/// A series whose patch files live in a private temporary directory
#[derive(Debug)]
pub struct StagedSeries {
    dir: TempDir,
    series: PatchSeries,
}

impl StagedSeries {
    /// Snapshot `series`, whose paths are relative to `patch_dir`.
    /// Compressed patches are stored decompressed.
    pub fn stage(series: &PatchSeries, patch_dir: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pq-staging-").tempdir()?;
        let mut staged = PatchSeries::new();

        for patch in series {
            let Some(src) = patch.path.as_ref() else {
                staged.append(patch.clone())?;
                continue;
            };

            let mut name = relative_name(src, patch_dir);
            if patch.is_compressed() {
                name.truncate(name.len() - ".gz".len());
            }
            let dest = dir.path().join(&name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            if patch.is_compressed() {
                decompress_to(src, &dest)?;
            } else {
                fs::copy(src, &dest)?;
            }
            debug!("Staged {} as {}", src.display(), dest.display());
            staged.append(patch.clone().with_path(dest))?;
        }

        staged.write(&dir.path().join("series"))?;
        Ok(Self {
            dir,
            series: staged,
        })
    }

    pub fn series(&self) -> &PatchSeries {
        &self.series
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::series::Patch;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_stage_copies_and_decompresses() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("topic")).unwrap();
        fs::write(src.path().join("a.patch"), "plain\n").unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"packed\n").unwrap();
        fs::write(src.path().join("topic/b.patch.gz"), encoder.finish().unwrap()).unwrap();

        let mut series = PatchSeries::new();
        series.append(Patch::new(src.path().join("a.patch"))).unwrap();
        series
            .append(
                Patch::new(src.path().join("topic/b.patch.gz"))
                    .with_strip(Some(0))
                    .with_topic(Some("topic".to_string())),
            )
            .unwrap();

        let staged = StagedSeries::stage(&series, src.path()).unwrap();
        let staged_dir = staged.path().to_path_buf();

        // The source may vanish once staged
        drop(src);

        let patches: Vec<_> = staged.series().iter().collect();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[1].strip, Some(0));
        assert!(!patches[1].is_compressed());
        assert_eq!(
            fs::read_to_string(patches[1].path.as_ref().unwrap()).unwrap(),
            "packed\n"
        );
        assert_eq!(
            fs::read_to_string(staged_dir.join("series")).unwrap(),
            "a.patch\ntopic/b.patch -p0\n"
        );

        drop(staged);
        assert!(!staged_dir.exists());
    }
}

pub mod settings;

pub use settings::{
    BranchSettings, ExportSettings, IdentitySettings, ImportSettings, PackagingSettings, Settings,
    VERSION_PLACEHOLDER,
};

use crate::errors::{PqError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration file inside a configuration directory
pub const CONFIG_FILE: &str = "config.json";

/// Get the user configuration directory (~/.pq/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| PqError::config("Could not find home directory"))?;
    Ok(home_dir.join(".pq"))
}

/// Get the configuration directory for a specific repository
pub fn get_repo_config_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".pq")
}

/// Configuration file used for `repo_path`: the repository's own file if
/// present, else the user's, else the repository location for new files
pub fn config_file_for_repo(repo_path: &Path) -> PathBuf {
    let repo_file = get_repo_config_dir(repo_path).join(CONFIG_FILE);
    if repo_file.exists() {
        return repo_file;
    }

    match get_config_dir() {
        Ok(dir) if dir.join(CONFIG_FILE).exists() => dir.join(CONFIG_FILE),
        _ => repo_file,
    }
}

impl Settings {
    /// Load the settings that apply to `repo_path`
    pub fn load_for_repo(repo_path: &Path) -> Result<Self> {
        let path = config_file_for_repo(repo_path);
        debug!("Loading configuration from {}", path.display());
        let settings = Self::load_from_file(&path)?;
        settings.validate()?;
        Ok(settings)
    }
}

use crate::errors::{PqError, Result};
use crate::pq::naming::DEFAULT_PQ_BRANCH_PATTERN;
use crate::pq::trailers::DEFAULT_TOPIC_REGEX;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Placeholder replaced by the upstream version in `branches.upstream_tag`
pub const VERSION_PLACEHOLDER: &str = "%(version)s";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub branches: BranchSettings,
    pub packaging: PackagingSettings,
    pub import: ImportSettings,
    pub export: ExportSettings,
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchSettings {
    /// Patch-queue branch name pattern, `%(branch)s` is the base branch
    pub pq_branch: String,
    /// Base branch for patterns without `%(branch)s`
    pub packaging_branch: String,
    /// Tag marking the upstream baseline, `%(version)s` is substituted
    pub upstream_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingSettings {
    /// Directory holding the packaging metadata, relative to the repository
    pub packaging_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Number of baselines to try, counting back from the branch tip
    pub tries: usize,
    /// Replace an existing patch-queue branch
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Prefix patch names with a sequence number
    pub patch_numbers: bool,
    /// Commits whose subject or a body line match are not exported
    pub ignore_regex: Option<String>,
    /// Legacy inline topic lines
    pub topic_regex: String,
    /// Squash commits up to this revision into one diff, `<rev>[:<name>]`
    pub squash_until: Option<String>,
    /// Export this revision instead of the patch-queue tip
    pub export_rev: Option<String>,
    /// Compress patches larger than this many bytes, 0 disables
    pub compress_threshold: u64,
    /// Commit the regenerated patches
    pub commit: bool,
    /// Delete the patch-queue branch after exporting
    pub drop: bool,
    /// Issue reference keys copied into single patch commit messages
    pub meta_closes: String,
    /// Format of an issue number
    pub meta_closes_bugnum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// `Name <email>` used for patches without author information
    pub maintainer: Option<String>,
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            pq_branch: DEFAULT_PQ_BRANCH_PATTERN.to_string(),
            packaging_branch: "master".to_string(),
            upstream_tag: None,
        }
    }
}

impl Default for PackagingSettings {
    fn default() -> Self {
        Self {
            packaging_dir: "debian".to_string(),
        }
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            tries: 1,
            force: false,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            patch_numbers: true,
            ignore_regex: None,
            topic_regex: DEFAULT_TOPIC_REGEX.to_string(),
            squash_until: None,
            export_rev: None,
            compress_threshold: 0,
            commit: false,
            drop: false,
            meta_closes: "Closes|LP".to_string(),
            meta_closes_bugnum: r"(?:bug|issue)?\#?\s?\d+".to_string(),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| PqError::config(format!("Invalid boolean value: {}", value)))
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PqError::config(format!("Invalid number: {}", value)))
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl Settings {
    /// All keys understood by `get_value`/`set_value`
    pub const KEYS: &'static [&'static str] = &[
        "branches.pq_branch",
        "branches.packaging_branch",
        "branches.upstream_tag",
        "packaging.packaging_dir",
        "import.tries",
        "import.force",
        "export.patch_numbers",
        "export.ignore_regex",
        "export.topic_regex",
        "export.squash_until",
        "export.export_rev",
        "export.compress_threshold",
        "export.commit",
        "export.drop",
        "export.meta_closes",
        "export.meta_closes_bugnum",
        "identity.maintainer",
    ];

    /// Load settings from a file, defaults if it does not exist
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PqError::config(format!("Failed to read config file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| PqError::config(format!("Failed to parse config file: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PqError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PqError::config(format!("Failed to create config directory: {}", e)))?;
        }
        fs::write(path, content)
            .map_err(|e| PqError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Update a configuration value by key; an empty value clears optional keys
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(PqError::config(format!("Invalid config key format: {}", key)));
        }

        match (parts[0], parts[1]) {
            ("branches", "pq_branch") => self.branches.pq_branch = value.to_string(),
            ("branches", "packaging_branch") => self.branches.packaging_branch = value.to_string(),
            ("branches", "upstream_tag") => self.branches.upstream_tag = optional(value),
            ("packaging", "packaging_dir") => self.packaging.packaging_dir = value.to_string(),
            ("import", "tries") => self.import.tries = parse_number(value)?,
            ("import", "force") => self.import.force = parse_bool(value)?,
            ("export", "patch_numbers") => self.export.patch_numbers = parse_bool(value)?,
            ("export", "ignore_regex") => self.export.ignore_regex = optional(value),
            ("export", "topic_regex") => self.export.topic_regex = value.to_string(),
            ("export", "squash_until") => self.export.squash_until = optional(value),
            ("export", "export_rev") => self.export.export_rev = optional(value),
            ("export", "compress_threshold") => {
                self.export.compress_threshold = parse_number(value)?
            }
            ("export", "commit") => self.export.commit = parse_bool(value)?,
            ("export", "drop") => self.export.drop = parse_bool(value)?,
            ("export", "meta_closes") => self.export.meta_closes = value.to_string(),
            ("export", "meta_closes_bugnum") => self.export.meta_closes_bugnum = value.to_string(),
            ("identity", "maintainer") => self.identity.maintainer = optional(value),
            _ => return Err(PqError::config(format!("Unknown config key: {}", key))),
        }

        Ok(())
    }

    /// Get a configuration value by key, empty for unset optional keys
    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(PqError::config(format!("Invalid config key format: {}", key)));
        }

        let value = match (parts[0], parts[1]) {
            ("branches", "pq_branch") => self.branches.pq_branch.clone(),
            ("branches", "packaging_branch") => self.branches.packaging_branch.clone(),
            ("branches", "upstream_tag") => self.branches.upstream_tag.clone().unwrap_or_default(),
            ("packaging", "packaging_dir") => self.packaging.packaging_dir.clone(),
            ("import", "tries") => self.import.tries.to_string(),
            ("import", "force") => self.import.force.to_string(),
            ("export", "patch_numbers") => self.export.patch_numbers.to_string(),
            ("export", "ignore_regex") => self.export.ignore_regex.clone().unwrap_or_default(),
            ("export", "topic_regex") => self.export.topic_regex.clone(),
            ("export", "squash_until") => self.export.squash_until.clone().unwrap_or_default(),
            ("export", "export_rev") => self.export.export_rev.clone().unwrap_or_default(),
            ("export", "compress_threshold") => self.export.compress_threshold.to_string(),
            ("export", "commit") => self.export.commit.to_string(),
            ("export", "drop") => self.export.drop.to_string(),
            ("export", "meta_closes") => self.export.meta_closes.clone(),
            ("export", "meta_closes_bugnum") => self.export.meta_closes_bugnum.clone(),
            ("identity", "maintainer") => self.identity.maintainer.clone().unwrap_or_default(),
            _ => return Err(PqError::config(format!("Unknown config key: {}", key))),
        };

        Ok(value)
    }

    /// Every key with its current value
    pub fn list_values(&self) -> Result<Vec<(String, String)>> {
        Self::KEYS
            .iter()
            .map(|key| Ok((key.to_string(), self.get_value(key)?)))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.branches.pq_branch.is_empty() {
            return Err(PqError::config("branches.pq_branch must not be empty"));
        }

        if self.packaging.packaging_dir.is_empty() {
            return Err(PqError::config("packaging.packaging_dir must not be empty"));
        }

        if self.import.tries == 0 {
            return Err(PqError::config("import.tries must be at least 1"));
        }

        let regexes = [
            ("export.ignore_regex", self.export.ignore_regex.as_deref()),
            ("export.topic_regex", Some(self.export.topic_regex.as_str())),
            ("export.meta_closes", Some(self.export.meta_closes.as_str())),
            ("export.meta_closes_bugnum", Some(self.export.meta_closes_bugnum.as_str())),
        ];
        for (key, pattern) in regexes {
            if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
                Regex::new(pattern)
                    .map_err(|e| PqError::config(format!("Invalid regex for {}: {}", key, e)))?;
            }
        }

        if let Some(maintainer) = self.identity.maintainer.as_deref() {
            if crate::git::Identity::parse(maintainer).is_none() {
                return Err(PqError::config(format!(
                    "identity.maintainer must look like 'Name <email>', got '{}'",
                    maintainer
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.branches.pq_branch, "patch-queue/%(branch)s");
        assert_eq!(settings.packaging.packaging_dir, "debian");
        assert_eq!(settings.import.tries, 1);
        assert!(settings.export.patch_numbers);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_set_and_get_value() {
        let mut settings = Settings::default();
        settings.set_value("import.tries", "5").unwrap();
        settings.set_value("export.commit", "true").unwrap();
        settings.set_value("identity.maintainer", "Jane <jane@example.com>").unwrap();

        assert_eq!(settings.get_value("import.tries").unwrap(), "5");
        assert_eq!(settings.get_value("export.commit").unwrap(), "true");
        assert_eq!(
            settings.get_value("identity.maintainer").unwrap(),
            "Jane <jane@example.com>"
        );

        settings.set_value("identity.maintainer", "").unwrap();
        assert_eq!(settings.identity.maintainer, None);
    }

    #[test]
    fn test_invalid_keys_and_values() {
        let mut settings = Settings::default();
        assert!(settings.set_value("nonsense", "x").is_err());
        assert!(settings.set_value("export.unknown", "x").is_err());
        assert!(settings.set_value("import.tries", "many").is_err());
        assert!(settings.set_value("export.drop", "maybe").is_err());
        assert!(settings.get_value("a.b.c").is_err());
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        settings.import.tries = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.export.ignore_regex = Some("(".to_string());
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.identity.maintainer = Some("nobody".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_list_covers_all_keys() {
        let values = Settings::default().list_values().unwrap();
        assert_eq!(values.len(), Settings::KEYS.len());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pq/config.json");

        let mut settings = Settings::default();
        settings.set_value("branches.upstream_tag", "upstream/%(version)s").unwrap();
        settings.save_to_file(&path).unwrap();

        assert_eq!(Settings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"import": {"tries": 4}}"#).unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.import.tries, 4);
        assert!(!settings.import.force);
        assert_eq!(settings.packaging.packaging_dir, "debian");
    }
}

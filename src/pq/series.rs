//! Quilt patch series model
//!
//! A series file lists one patch per line, relative to the directory the
//! series file lives in, optionally followed by a `-pN` strip level. Blank
//! lines and `#` comments are ignored.

use crate::errors::{PqError, Result};
use crate::git::Identity;
use chrono::DateTime;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Strip level used when a series entry carries no `-p` option
pub const DEFAULT_STRIP: u32 = 1;

/// One unit of change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Location of the patch file, relative or absolute
    pub path: Option<PathBuf>,
    /// Explicit strip level, `None` for the default
    pub strip: Option<u32>,
    /// Grouping label, rendered as a subdirectory
    pub topic: Option<String>,
    pub subject: String,
    pub long_desc: String,
    pub author: Option<Identity>,
}

impl Patch {
    /// Patch for `path` whose subject is derived from the file name
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let subject = subject_from_filename(&path);
        Self {
            path: Some(path),
            strip: None,
            topic: None,
            subject,
            long_desc: String::new(),
            author: None,
        }
    }

    /// Read a patch file, taking subject, description and authorship from
    /// its mail (`From:`, `Subject:`, `Date:`) or DEP-3 (`Author:`,
    /// `Description:`) headers when present
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let text = read_patch_text(&path)?;
        let header = PatchHeader::parse(&text);

        let mut patch = Self::new(path);
        if let Some(subject) = header.subject {
            patch.subject = subject;
        }
        patch.long_desc = header.long_desc;
        patch.author = header.author.map(|author| match header.date {
            Some(date) => author.with_date(date),
            None => author,
        });
        Ok(patch)
    }

    pub fn with_strip(mut self, strip: Option<u32>) -> Self {
        self.strip = strip;
        self
    }

    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic.filter(|t| !t.is_empty());
        self
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Strip level to apply the patch with
    pub fn strip_level(&self) -> u32 {
        self.strip.unwrap_or(DEFAULT_STRIP)
    }

    /// File name without directories
    pub fn filename(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Whether the patch file is gzip compressed
    pub fn is_compressed(&self) -> bool {
        self.path
            .as_ref()
            .is_some_and(|p| p.extension().is_some_and(|ext| ext == "gz"))
    }

    /// Whether both author name and email are known
    pub fn has_authorship(&self) -> bool {
        self.author
            .as_ref()
            .is_some_and(|a| !a.name.is_empty() && !a.email.is_empty())
    }

    /// Display name for log messages
    pub fn display_name(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.subject.clone())
    }
}

/// Read a patch file as text, decompressing `.gz` files
pub fn read_patch_text(path: &Path) -> Result<String> {
    let raw = fs::read(path)?;
    let bytes = if path.extension().is_some_and(|ext| ext == "gz") {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
        decoded
    } else {
        raw
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Subject guessed from a patch file name: `0003-fix-build.patch` → `fix-build`
pub fn subject_from_filename(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for suffix in [".gz", ".patch", ".diff"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }

    let digits = name.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && name[digits..].starts_with('-') {
        name[digits + 1..].to_string()
    } else {
        name
    }
}

/// Drop a leading `[PATCH n/m]` marker from a subject
fn strip_subject_prefix(subject: &str) -> &str {
    if subject.starts_with('[') {
        if let Some(end) = subject.find(']') {
            return subject[end + 1..].trim_start();
        }
    }
    subject
}

/// Information found at the head of a patch file
#[derive(Debug, Default)]
struct PatchHeader {
    author: Option<Identity>,
    date: Option<DateTime<chrono::FixedOffset>>,
    subject: Option<String>,
    long_desc: String,
}

impl PatchHeader {
    fn parse(text: &str) -> Self {
        let mut header = PatchHeader::default();
        let mut body: Vec<&str> = Vec::new();
        let mut in_headers = true;
        let mut seen_header = false;
        let mut last_key = String::new();

        for line in text.lines() {
            if is_diff_start(line) {
                break;
            }

            if !in_headers {
                body.push(line);
                continue;
            }

            if line.trim().is_empty() {
                if seen_header {
                    in_headers = false;
                }
                continue;
            }

            if !seen_header && line.starts_with("From ") {
                // mbox separator
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded header line
                match last_key.as_str() {
                    "subject" => {
                        if let Some(subject) = header.subject.as_mut() {
                            subject.push(' ');
                            subject.push_str(line.trim());
                        }
                    }
                    "description" => body.push(line.trim()),
                    _ => {}
                }
                continue;
            }

            match line.split_once(':') {
                Some((key, value)) if !key.is_empty() && !key.contains(char::is_whitespace) => {
                    seen_header = true;
                    last_key = key.to_ascii_lowercase();
                    let value = value.trim();
                    match last_key.as_str() {
                        "from" | "author" => header.author = Identity::parse(value),
                        "date" => header.date = DateTime::parse_from_rfc2822(value).ok(),
                        "subject" | "description" => {
                            header.subject = Some(strip_subject_prefix(value).to_string());
                        }
                        _ => {}
                    }
                }
                _ => {
                    in_headers = false;
                    body.push(line);
                }
            }
        }

        header.long_desc = body.join("\n").trim().to_string();
        if !header.long_desc.is_empty() {
            header.long_desc.push('\n');
        }
        header
    }
}

fn is_diff_start(line: &str) -> bool {
    line == "---"
        || line.starts_with("--- ")
        || line.starts_with("diff --git ")
        || line.starts_with("Index: ")
}

/// Parse one series line into a relative file name and optional strip level.
/// Returns `None` for blank and comment lines.
pub fn parse_series_line(
    line: &str,
    lineno: usize,
    source: &Path,
) -> Result<Option<(String, Option<u32>)>> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if let Some(pos) = line.find(" #") {
        line = line[..pos].trim_end();
    }

    let mut tokens = line.split_whitespace();
    let name = match tokens.next() {
        Some(name) => name.to_string(),
        None => return Ok(None),
    };

    let mut strip = None;
    while let Some(token) = tokens.next() {
        let value = match token.strip_prefix("-p") {
            Some("") => tokens
                .next()
                .ok_or_else(|| PqError::format(source, lineno, "option '-p' needs a value"))?,
            Some(value) => value,
            None => {
                return Err(PqError::format(
                    source,
                    lineno,
                    format!("unsupported option '{}'", token),
                ))
            }
        };
        let level = value.parse::<u32>().map_err(|_| {
            PqError::format(source, lineno, format!("invalid strip level '{}'", value))
        })?;
        strip = Some(level);
    }

    Ok(Some((name, strip)))
}

/// Topic of a series entry: its directory relative to the series file
fn topic_from_relative(name: &str) -> Option<String> {
    Path::new(name)
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .filter(|t| !t.is_empty())
}

/// Render `path` relative to `base` with `/` separators
pub fn relative_name(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Ordered list of patches; order is application order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSeries {
    patches: Vec<Patch>,
}

impl PatchSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a series file; patch paths are resolved against its directory
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base, path)
    }

    /// Parse series file content; `source` is only used in error messages
    pub fn parse(content: &str, base: &Path, source: &Path) -> Result<Self> {
        let mut series = Self::new();

        for (idx, line) in content.lines().enumerate() {
            let Some((name, strip)) = parse_series_line(line, idx + 1, source)? else {
                continue;
            };

            let file = base.join(&name);
            let patch = if file.is_file() {
                Patch::from_file(&file)?
            } else {
                debug!("{} does not exist (yet)", file.display());
                Patch::new(&file)
            };
            series.append(
                patch
                    .with_strip(strip)
                    .with_topic(topic_from_relative(&name)),
            )?;
        }

        Ok(series)
    }

    /// Write the series file, one path relative to its directory per line
    pub fn write(&self, path: &Path) -> Result<()> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render(base))?;
        Ok(())
    }

    /// Series file content with paths relative to `base`
    pub fn render(&self, base: &Path) -> String {
        let mut out = String::new();
        for patch in &self.patches {
            let Some(path) = patch.path.as_ref() else {
                continue;
            };
            out.push_str(&relative_name(path, base));
            if let Some(strip) = patch.strip.filter(|s| *s != DEFAULT_STRIP) {
                out.push_str(&format!(" -p{}", strip));
            }
            out.push('\n');
        }
        out
    }

    /// Add a patch to the end of the series
    pub fn append(&mut self, patch: Patch) -> Result<()> {
        if let Some(path) = patch.path.as_ref() {
            if self.patches.iter().any(|p| p.path.as_ref() == Some(path)) {
                return Err(PqError::DuplicatePatch(path.display().to_string()));
            }
        }
        self.patches.push(patch);
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.patches.iter()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Patch file names relative to `base`
    pub fn filenames(&self, base: &Path) -> Vec<String> {
        self.patches
            .iter()
            .filter_map(|p| p.path.as_ref())
            .map(|p| relative_name(p, base))
            .collect()
    }
}

impl<'a> IntoIterator for &'a PatchSeries {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}

/// Patch names added to and removed from a series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesDiff {
    /// In the order of the new series
    pub added: Vec<String>,
    /// In the order of the old series
    pub removed: Vec<String>,
}

impl SeriesDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two lists of patch names
pub fn compare_series(old: &[String], new: &[String]) -> SeriesDiff {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    SeriesDiff {
        added: new
            .iter()
            .filter(|n| !old_set.contains(n.as_str()))
            .cloned()
            .collect(),
        removed: old
            .iter()
            .filter(|o| !new_set.contains(o.as_str()))
            .cloned()
            .collect(),
    }
}

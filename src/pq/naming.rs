//! Patch-queue branch naming
//!
//! A patch-queue branch name is derived from its base branch by substituting
//! the base name for the `%(branch)s` placeholder of a configurable pattern.
//! Patterns without the placeholder describe one fixed patch-queue branch
//! whose base is the configured packaging branch.

use regex::Regex;
use tracing::warn;

/// Default patch-queue branch pattern
pub const DEFAULT_PQ_BRANCH_PATTERN: &str = "patch-queue/%(branch)s";

/// Placeholder replaced by the base branch name
pub const BRANCH_PLACEHOLDER: &str = "%(branch)s";

/// Compiled patch-queue branch pattern
#[derive(Debug, Clone)]
pub struct BranchPattern {
    pattern: String,
    packaging_branch: String,
    matcher: Option<Regex>,
}

impl BranchPattern {
    /// Create a pattern; `packaging_branch` is the base used when the pattern
    /// has no placeholder
    pub fn new<P: Into<String>, B: Into<String>>(pattern: P, packaging_branch: B) -> Self {
        let pattern = pattern.into();
        // Only the placeholder is turned into a capture, the rest is used as is
        let source = format!("^{}$", pattern.replace(BRANCH_PLACEHOLDER, r"(?P<base>\S+)"));
        let matcher = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Patch-queue branch pattern '{}' is not a valid regex: {}", pattern, e);
                None
            }
        };

        Self {
            pattern,
            packaging_branch: packaging_branch.into(),
            matcher,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn packaging_branch(&self) -> &str {
        &self.packaging_branch
    }

    /// Whether the pattern references the base branch name
    pub fn has_placeholder(&self) -> bool {
        self.pattern.contains(BRANCH_PLACEHOLDER)
    }

    /// Is `branch` a patch-queue branch?
    pub fn is_patch_queue(&self, branch: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(branch),
            None => !self.has_placeholder() && branch == self.pattern,
        }
    }

    /// Patch-queue branch belonging to `base`, `None` if `base` already is one
    pub fn patch_queue_name(&self, base: &str) -> Option<String> {
        if self.is_patch_queue(base) {
            return None;
        }
        Some(self.pattern.replace(BRANCH_PLACEHOLDER, base))
    }

    /// Base branch of the patch-queue branch `pq_branch`
    pub fn patch_queue_base(&self, pq_branch: &str) -> Option<String> {
        if !self.has_placeholder() {
            return self
                .is_patch_queue(pq_branch)
                .then(|| self.packaging_branch.clone());
        }

        self.matcher
            .as_ref()?
            .captures(pq_branch)?
            .name("base")
            .map(|m| m.as_str().to_string())
    }
}

impl Default for BranchPattern {
    fn default() -> Self {
        Self::new(DEFAULT_PQ_BRANCH_PATTERN, "master")
    }
}

/// Is `branch_name` a patch-queue branch according to `pattern`?
pub fn is_patch_queue(branch_name: &str, pattern: &str) -> bool {
    BranchPattern::new(pattern, "").is_patch_queue(branch_name)
}

/// Patch-queue branch name for `base_branch`
pub fn patch_queue_name(base_branch: &str, pattern: &str) -> Option<String> {
    BranchPattern::new(pattern, "").patch_queue_name(base_branch)
}

/// Base branch of `pq_branch`, `fallback_base` for placeholder-less patterns
pub fn patch_queue_base(pq_branch: &str, pattern: &str, fallback_base: &str) -> Option<String> {
    BranchPattern::new(pattern, fallback_base).patch_queue_base(pq_branch)
}

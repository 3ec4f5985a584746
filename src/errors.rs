use std::path::PathBuf;

/// Exit status for a successful run
pub const EXIT_OK: u8 = 0;
/// Exit status when an operation failed
pub const EXIT_FAILED: u8 = 1;
/// Exit status for an invalid combination of action and arguments
pub const EXIT_USAGE: u8 = 2;
/// Exit status when the action was skipped because there was nothing to do
pub const EXIT_NOTHING_TO_DO: u8 = 3;

/// Patch queue error types
#[derive(Debug, thiserror::Error)]
pub enum PqError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid regular expression in configuration
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid combination of action and arguments
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Import requested while standing on a patch-queue branch
    #[error("Already on a patch-queue branch '{0}' - doing nothing")]
    AlreadyOnQueue(String),

    /// Import requested while the patch-queue branch already exists
    #[error("Patch-queue branch '{0}' already exists. Try 'rebase' instead")]
    QueueExists(String),

    /// A single patch failed to apply
    #[error("Failed to apply '{patch}': {reason}")]
    Apply { patch: String, reason: String },

    /// Every candidate baseline failed
    #[error("Couldn't apply patches on any of the {tried} baseline(s) tried")]
    NoApplicableBaseline { tried: usize },

    /// Malformed series file or metadata
    #[error("{}:{line}: {reason}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The same patch file was added to a series twice
    #[error("Patch '{0}' appears more than once in the series")]
    DuplicatePatch(String),

    /// Branch management errors
    #[error("Branch error: {0}")]
    Branch(String),

    /// Rebase operation errors
    #[error("Rebase error: {0}")]
    Rebase(String),
}

impl PqError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PqError::Config(msg.into())
    }

    pub fn branch<S: Into<String>>(msg: S) -> Self {
        PqError::Branch(msg.into())
    }

    pub fn usage<S: Into<String>>(msg: S) -> Self {
        PqError::Usage(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        PqError::Rebase(msg.into())
    }

    pub fn apply<P: Into<String>, R: Into<String>>(patch: P, reason: R) -> Self {
        PqError::Apply {
            patch: patch.into(),
            reason: reason.into(),
        }
    }

    pub fn format<P: Into<PathBuf>, R: Into<String>>(path: P, line: usize, reason: R) -> Self {
        PqError::Format {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            PqError::Usage(_) => EXIT_USAGE,
            _ => EXIT_FAILED,
        }
    }

    /// Whether the error is a local patch application failure that the
    /// import engine may recover from by trying an older baseline
    pub fn is_recoverable_apply_failure(&self) -> bool {
        matches!(self, PqError::Apply { .. } | PqError::Git(_))
    }
}

pub type Result<T> = std::result::Result<T, PqError>;

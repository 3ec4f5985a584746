pub mod commands;
pub mod output;

use crate::errors::{Result, EXIT_OK};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pq")]
#[command(about = "Keep quilt patch series and patch-queue branches in sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Repository to work on (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Patch-queue branch name pattern, e.g. 'patch-queue/%(branch)s'
    #[arg(long, global = true, value_name = "PATTERN")]
    pub pq_branch: Option<String>,

    /// Packaging directory relative to the repository root
    #[arg(long, global = true, value_name = "DIR")]
    pub packaging_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export the patch queue into the quilt series
    Export {
        /// Commit the regenerated patches
        #[arg(long)]
        commit: bool,

        /// Delete the patch-queue branch after exporting
        #[arg(long)]
        drop: bool,

        /// Don't prefix patch names with a sequence number
        #[arg(long)]
        no_patch_numbers: bool,

        /// Squash commits up to this revision into one diff, `<rev>[:<name>]`
        #[arg(long, value_name = "REV")]
        squash_until: Option<String>,

        /// Export this revision instead of the patch-queue tip
        #[arg(long, value_name = "REV")]
        export_rev: Option<String>,

        /// Skip commits whose message matches this regex
        #[arg(long, value_name = "REGEX")]
        ignore_regex: Option<String>,

        /// Compress patches larger than this many bytes
        #[arg(long, value_name = "BYTES")]
        compress: Option<u64>,

        /// Upstream tag the patches are relative to, may contain '%(version)s'
        #[arg(long, value_name = "TAG")]
        upstream_tag: Option<String>,
    },

    /// Import the quilt series into a new patch-queue branch
    Import {
        /// Replace an existing patch-queue branch
        #[arg(long)]
        force: bool,

        /// Number of baselines to try when patches don't apply
        #[arg(long, value_name = "N")]
        tries: Option<usize>,
    },

    /// Rebase the patch-queue branch onto its base branch
    Rebase,

    /// Delete the patch-queue branch
    Drop,

    /// Switch between a branch and its patch-queue branch
    Switch,

    /// Apply a single patch on the patch-queue branch
    Apply {
        /// Patch file to apply
        patch: Option<PathBuf>,

        /// Topic to record for the patch
        #[arg(long)]
        topic: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., import.tries)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

/// Per-run overrides taken from the global flags
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub repo: Option<PathBuf>,
    pub pq_branch: Option<String>,
    pub packaging_dir: Option<String>,
}

impl Cli {
    /// Run the selected command and return the process exit status
    pub fn run(self) -> Result<u8> {
        // Set up logging based on verbosity
        self.setup_logging();
        if self.no_color {
            console::set_colors_enabled(false);
        }

        let global = GlobalArgs {
            repo: self.repo.clone(),
            pq_branch: self.pq_branch.clone(),
            packaging_dir: self.packaging_dir.clone(),
        };

        match self.command {
            Commands::Config { action } => commands::config::run(&global, action).map(|_| EXIT_OK),
            Commands::Completions { shell } => {
                commands::completions::generate_completions(shell).map(|_| EXIT_OK)
            }
            command => commands::queue::run(&global, command),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}

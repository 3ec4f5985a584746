use crate::errors::PqError;
use console::style;
use std::fmt::Display;

/// Centralized output formatting utilities for consistent CLI presentation
pub struct Output;

impl Output {
    /// Print a success message with checkmark
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    /// Print an error message with X mark
    pub fn error<T: Display>(message: T) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    /// Print a warning message with warning emoji
    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    /// Print an info message with info emoji
    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Print a sub-item with arrow prefix
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    /// Print a bullet point
    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    /// Print a section header
    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    /// Print a tip/suggestion
    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    /// Print a command example
    pub fn command_example<T: Display>(command: T) {
        println!("  {}", style(command).yellow());
    }

    /// Print an error followed by a hint on how to get going again
    pub fn pq_error(err: &PqError) {
        Self::error(err);
        match err {
            PqError::AlreadyOnQueue(_) => {
                Self::tip("Switch to the base branch first, or replace the queue with:");
                Self::command_example("pq import --force");
            }
            PqError::QueueExists(_) => {
                Self::tip("Update the existing queue instead:");
                Self::command_example("pq rebase");
            }
            PqError::NoApplicableBaseline { .. } => {
                Self::tip("Try more baselines with 'pq import --tries <N>' or refresh the patches");
            }
            PqError::Rebase(_) => {
                Self::tip("Fix the conflicts, then run 'git rebase --continue'");
            }
            _ => {}
        }
    }
}

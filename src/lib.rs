pub mod cli;
pub mod config;
pub mod errors;
pub mod git;
pub mod metadata;
pub mod pq;

pub use errors::{PqError, Result};

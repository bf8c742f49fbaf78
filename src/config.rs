//! Runtime configuration shared by the library and the command line.

use clap::Args;
use std::path::PathBuf;

/// Where and how git is invoked.
///
/// Flattened into the CLI; every field also reads from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Repository to operate on
    #[arg(short = 'C', long, env = "GIT_CHUNKS_REPO", default_value = ".", global = true)]
    pub repo: PathBuf,

    /// Git executable
    #[arg(long, env = "GIT_CHUNKS_GIT", default_value = "git", global = true)]
    pub git: PathBuf,

    /// Unchanged lines of context around each hunk
    #[arg(
        short = 'U',
        long = "unified",
        env = "GIT_CHUNKS_CONTEXT",
        default_value_t = 3,
        global = true
    )]
    pub context_lines: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            git: PathBuf::from("git"),
            context_lines: 3,
        }
    }
}

impl Config {
    #[must_use]
    pub fn for_repo(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }
}

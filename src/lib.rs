//! Hunk and line level staging for git.
//!
//! Diffs are parsed into [`diff::Hunk`]s, a selection of their lines is turned
//! into a minimal patch by [`patch::synthesize`], and a
//! [`session::StagingSession`] applies it to the index through a
//! [`gateway::PatchBackend`], keeping an undo history of what it applied.

use error_set::error_set;

pub mod config;
pub mod diff;
pub mod gateway;
pub mod history;
pub mod parse;
pub mod patch;
pub mod session;
pub mod state;

pub use config::Config;
pub use diff::{ParseError, format_diff};
pub use gateway::{ApplyGate, GitCli, GitCommandError, PatchBackend};
pub use history::HistoryError;
pub use parse::RefParseError;
pub use patch::SynthesisError;
pub use session::{Snapshot, StagingError, StagingSession, format_status};

use parse::{parse_file_refs, resolve};
use state::Side;

error_set! {
    /// Top-level error for git-chunks operations
    GitChunksError := {
        #[display("No changes found in {file}")]
        NoChanges { file: String },
        ParseError(ParseError),
        RefParseError(RefParseError),
        SynthesisError(SynthesisError),
        GitCommandError(GitCommandError),
        HistoryError(HistoryError),
        StagingError(StagingError),
    }
}

/// Staging entry point for one repository
pub struct GitChunks {
    cli: GitCli,
    gate: ApplyGate,
}

impl GitChunks {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            cli: GitCli::from_config(config),
            gate: ApplyGate::new(),
        }
    }

    /// A session for `path`, sharing this repository's apply gate
    #[must_use]
    pub fn session(&self, path: &str) -> StagingSession<GitCli> {
        StagingSession::with_gate(self.cli.clone(), path, self.gate.clone())
    }

    /// Numbered listing of the unstaged (or staged) changes of `files`, or
    /// of every changed file when `files` is empty.
    ///
    /// # Examples
    /// ```no_run
    /// # use git_chunks::{Config, GitChunks};
    /// let chunks = GitChunks::new(&Config::default());
    /// let listing = chunks.diff(&[], false).unwrap();
    /// let listing = chunks.diff(&["flake.nix".to_string()], true).unwrap();
    /// ```
    pub fn diff(&self, files: &[String], staged: bool) -> Result<String, GitChunksError> {
        let raw = self.cli.raw_diff(files, staged)?;
        Ok(format_diff(&diff::Diff::parse(&raw)?))
    }

    /// Current classification of `path`
    pub fn status(&self, path: &str) -> Result<Snapshot, GitChunksError> {
        Ok(self.session(path).refresh()?.clone())
    }

    /// Stage the lines named by a `file:refs` reference.
    ///
    /// # Examples
    /// ```no_run
    /// # use git_chunks::{Config, GitChunks};
    /// let chunks = GitChunks::new(&Config::default());
    /// chunks.stage("flake.nix:137").unwrap();
    /// chunks.stage("file.nix:10..15,-20").unwrap();
    /// chunks.stage("config.nix:h0").unwrap();
    /// ```
    pub fn stage(&self, file_ref: &str) -> Result<Snapshot, GitChunksError> {
        self.apply_refs(file_ref, Side::Unstaged)
    }

    /// Remove the lines named by a `file:refs` reference from the index.
    ///
    /// References are read against the staged diff: added lines by their
    /// index line number, deleted lines by their HEAD line number.
    pub fn unstage(&self, file_ref: &str) -> Result<Snapshot, GitChunksError> {
        self.apply_refs(file_ref, Side::Staged)
    }

    fn apply_refs(&self, file_ref: &str, side: Side) -> Result<Snapshot, GitChunksError> {
        let refs = parse_file_refs(file_ref)?;
        let mut session = self.session(&refs.file);

        let selection = {
            let file = session.refresh()?.diff(side);
            if file.is_empty() {
                return Err(GitChunksError::NoChanges { file: refs.file });
            }
            resolve(&refs.refs, file)?
        };

        // Later hunks first so earlier indices stay valid
        for (hunk_index, lines) in selection.into_iter().rev() {
            match side {
                Side::Unstaged => session.stage_lines(hunk_index, lines)?,
                Side::Staged => session.discard_lines(hunk_index, lines)?,
            };
        }

        Ok(session.refresh()?.clone())
    }
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use git_chunks::session::StagingSession;
use git_chunks::state::{Side, StageStatus};
use git_chunks::{Config, GitChunks, GitChunksError, GitCli, RefParseError};
use git2::{Repository, Signature};
use similar_asserts::assert_eq;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// A throwaway repository with one committed file
struct Fixture {
    dir: TempDir,
    repo: Repository,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repo = Repository::init(dir.path()).expect("Failed to init repo");

        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();

        Self { dir, repo }
    }

    /// Commit `content` as `name`, then overwrite the working copy with `modified`
    fn with_file(name: &str, content: &str, modified: &str) -> Self {
        let fixture = Self::new();
        fixture.write_file(name, content);
        fixture.stage_file(name);
        fixture.commit("initial");
        fixture.write_file(name, modified);
        fixture
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self, context_lines: u32) -> Config {
        Config {
            context_lines,
            ..Config::for_repo(self.path())
        }
    }

    fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn stage_file(&self, name: &str) {
        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
    }

    fn commit(&self, message: &str) {
        let sig = Signature::new(
            "Test User",
            "test@example.com",
            &git2::Time::new(1234567890, 0),
        )
        .unwrap();
        let tree_id = self.repo.index().unwrap().write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        let parents: Vec<git2::Commit> = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parents: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    /// Content of `name` as recorded in the index
    fn index_content(&self, name: &str) -> String {
        let mut index = self.repo.index().unwrap();
        index.read(true).unwrap();
        let entry = index.get_path(Path::new(name), 0).unwrap();
        let blob = self.repo.find_blob(entry.id).unwrap();
        String::from_utf8(blob.content().to_vec()).unwrap()
    }

    /// Hunks of `git diff -U0`, without file headers
    fn git_diff(&self, file: &str, cached: bool) -> String {
        let mut args = vec![
            "-C",
            self.path().to_str().unwrap(),
            "diff",
            "--no-ext-diff",
            "-U0",
            "--no-color",
        ];
        if cached {
            args.push("--cached");
        }
        args.extend(["--", file]);

        let output = Command::new("git")
            .args(&args)
            .output()
            .expect("Failed to run git diff");
        let text = String::from_utf8(output.stdout).unwrap();
        match text.find("@@") {
            Some(start) => text[start..].to_string(),
            None => String::new(),
        }
    }
}

fn lines(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{i} line")).collect()
}

fn join(lines: &[String]) -> String {
    lines.join("\n") + "\n"
}

/// Line 3 replaced, a line inserted after line 5. Every line starts with a
/// digit so git finds no function context for hunk headers.
fn edited(n: usize) -> (String, String) {
    let head = lines(n);
    let mut worktree = head.clone();
    worktree[2] = "3 LINE".to_string();
    worktree.insert(5, "5 inserted".to_string());
    (join(&head), join(&worktree))
}

#[test]
fn diff_listing_numbers_hunks_and_lines() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(0));

    let listing = chunks.diff(&["notes.txt".to_string()], false).unwrap();
    assert_eq!(
        listing,
        "notes.txt:\n\
         \x20 [0] @@ -3,1 +3,1 @@\n\
         \x20   0: -3:\t3 line\n\
         \x20   1: +3:\t3 LINE\n\
         \x20 [1] @@ -5,0 +6,1 @@\n\
         \x20   0: +6:\t5 inserted\n"
    );
    assert_eq!(chunks.diff(&[], true).unwrap(), "");
}

#[test]
fn stage_single_addition_by_line_number() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(3));

    chunks.stage("notes.txt:6").unwrap();

    assert_eq!(fixture.git_diff("notes.txt", true), "@@ -5,0 +6 @@\n+5 inserted\n");
    assert_eq!(
        fixture.git_diff("notes.txt", false),
        "@@ -3 +3 @@\n-3 line\n+3 LINE\n"
    );
}

#[test]
fn stage_deletion_without_its_replacement() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(0));

    let snapshot = chunks.stage("notes.txt:-3").unwrap();

    assert_eq!(fixture.git_diff("notes.txt", true), "@@ -3 +2,0 @@\n-3 line\n");
    assert_eq!(
        snapshot.staging.status(Side::Staged, 0),
        Some(StageStatus::PartiallyStaged)
    );
}

#[test]
fn stage_whole_hunk_reference() {
    let (head, worktree) = edited(30);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(3));

    chunks.stage("notes.txt:h0").unwrap();

    let staged = fixture.git_diff("notes.txt", true);
    assert_eq!(
        staged,
        "@@ -3 +3 @@\n-3 line\n+3 LINE\n@@ -5,0 +6 @@\n+5 inserted\n"
    );
    assert_eq!(fixture.git_diff("notes.txt", false), "");
}

#[test]
fn unstage_one_addition() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    fixture.stage_file("notes.txt");
    let chunks = GitChunks::new(&fixture.config(3));

    // Staged diff numbers additions by their line in the index
    chunks.unstage("notes.txt:6").unwrap();

    assert_eq!(
        fixture.git_diff("notes.txt", true),
        "@@ -3 +3 @@\n-3 line\n+3 LINE\n"
    );
    assert_eq!(fixture.git_diff("notes.txt", false), "@@ -5,0 +6 @@\n+5 inserted\n");
}

#[test]
fn unmatched_reference_is_an_error() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(3));

    let err = chunks.stage("notes.txt:9").unwrap_err();
    assert!(matches!(
        err,
        GitChunksError::RefParseError(RefParseError::UnmatchedRef { .. })
    ));
    assert_eq!(fixture.git_diff("notes.txt", true), "");
}

#[test]
fn clean_file_has_no_changes() {
    let (head, _) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &head);
    let chunks = GitChunks::new(&fixture.config(3));

    assert!(matches!(
        chunks.stage("notes.txt:1"),
        Err(GitChunksError::NoChanges { .. })
    ));
}

#[test]
fn session_undo_and_redo_through_git() {
    let (head, worktree) = edited(30);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let mut session = StagingSession::new(GitCli::from_config(&fixture.config(0)), "notes.txt");

    session.refresh().unwrap();
    session.stage_lines(0, BTreeSet::from([0])).unwrap();
    let after_lines = fixture.git_diff("notes.txt", true);
    assert_eq!(after_lines, "@@ -3 +2,0 @@\n-3 line\n");

    session.stage_hunk(1).unwrap();
    let after_hunk = fixture.git_diff("notes.txt", true);
    assert_eq!(
        after_hunk,
        "@@ -3 +2,0 @@\n-3 line\n@@ -5,0 +5 @@\n+5 inserted\n"
    );

    session.undo().unwrap();
    assert_eq!(fixture.git_diff("notes.txt", true), after_lines);
    session.undo().unwrap();
    assert_eq!(fixture.git_diff("notes.txt", true), "");

    session.redo().unwrap();
    session.redo().unwrap();
    assert_eq!(fixture.git_diff("notes.txt", true), after_hunk);
}

#[test]
fn index_moved_under_session_is_refused() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("notes.txt", &head, &worktree);
    let mut session = StagingSession::new(GitCli::from_config(&fixture.config(0)), "notes.txt");
    session.refresh().unwrap();

    // The index moves under the session, so its snapshot no longer matches
    fixture.stage_file("notes.txt");
    assert!(session.stage_hunk(0).is_err());
    assert!(session.history().is_empty());
}

#[test]
fn stage_whole_hunk_of_crlf_file() {
    let fixture = Fixture::new();
    fixture
        .repo
        .config()
        .unwrap()
        .set_bool("core.autocrlf", false)
        .unwrap();
    fixture.write_file("dos.txt", "a\r\nb\r\nc\r\n");
    fixture.stage_file("dos.txt");
    fixture.commit("initial");
    fixture.write_file("dos.txt", "a\r\nB\r\nc\r\n");

    let mut session = StagingSession::new(GitCli::from_config(&fixture.config(3)), "dos.txt");
    session.refresh().unwrap();
    session.stage_hunk(0).unwrap();

    assert_eq!(fixture.index_content("dos.txt"), "a\r\nB\r\nc\r\n");
    assert_eq!(fixture.git_diff("dos.txt", false), "");
}

#[test]
fn stage_addition_after_line_without_newline() {
    let fixture = Fixture::with_file("tail.txt", "1 a\n2 b", "1 a\n2 b\n3 c\n");
    let mut session = StagingSession::new(GitCli::from_config(&fixture.config(3)), "tail.txt");

    // [ a, -b, \ No newline, +b, +c ]: only `+c` is selected
    session.refresh().unwrap();
    session.stage_lines(0, BTreeSet::from([3])).unwrap();

    assert_eq!(fixture.index_content("tail.txt"), "1 a\n2 b\n3 c\n");
    assert_eq!(session.history().len(), 1);

    session.undo().unwrap();
    assert_eq!(fixture.index_content("tail.txt"), "1 a\n2 b");
}

#[test]
fn quoted_path_is_listed_and_staged_by_name() {
    let (head, worktree) = edited(10);
    let fixture = Fixture::with_file("café.txt", &head, &worktree);
    let chunks = GitChunks::new(&fixture.config(0));

    let listing = chunks.diff(&[], false).unwrap();
    assert!(listing.starts_with("café.txt:\n"));

    chunks.stage("café.txt:6").unwrap();
    assert_eq!(fixture.git_diff("café.txt", true), "@@ -5,0 +6 @@\n+5 inserted\n");
}

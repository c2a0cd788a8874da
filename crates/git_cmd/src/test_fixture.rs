//! Helpers to create throwaway git repositories in tests.

use camino::Utf8Path;

use crate::Repo;

impl Repo {
    /// Initialize a new repository with an initial commit.
    ///
    /// User identity and signing are configured locally so tests don't
    /// depend on the global git configuration.
    pub fn init(directory: impl AsRef<Utf8Path>) -> Self {
        let directory = directory.as_ref();
        crate::git_in(directory, &["init", "-b", "main"]).unwrap();
        crate::git_in(directory, &["config", "user.name", "nagare-test"]).unwrap();
        crate::git_in(directory, &["config", "user.email", "nagare-test@example.com"]).unwrap();
        crate::git_in(directory, &["config", "commit.gpgsign", "false"]).unwrap();
        crate::git_in(directory, &["config", "tag.gpgSign", "false"]).unwrap();
        fs_err::write(directory.join(".gitignore").as_std_path(), "target/\n").unwrap();
        crate::git_in(directory, &["add", "."]).unwrap();
        crate::git_in(directory, &["commit", "-m", "chore: initial commit"]).unwrap();
        Self::new(directory).unwrap()
    }

    /// Stage everything and commit with the given message.
    pub fn add_all_and_commit(&self, message: &str) {
        self.git(&["add", "."]).unwrap();
        self.git(&["commit", "--no-verify", "-m", message]).unwrap();
    }

    /// Create an empty commit with the given message.
    pub fn commit_empty(&self, message: &str) {
        self.git(&["commit", "--allow-empty", "--no-verify", "-m", message])
            .unwrap();
    }
}

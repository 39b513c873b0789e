//! Subprocess shim for `git merge-base` and `git merge-tree`.
//!
//! These are the only two Git operations the toolkit does not reimplement.
//! Both arguments and the subprocess output must be exactly 40 lowercase
//! hex characters; the argument check doubles as a shell-injection guard
//! since ids come from decoded repository data.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::git::ObjectId;

use super::config::is_hex_sha1;

/// Subprocess failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum GitCliError {
    /// An argument was not a 40-character hex id.
    BadArgument { got: String },
    /// The subprocess could not be spawned.
    Spawn { err: std::io::Error },
    /// The subprocess exited nonzero.
    Failed {
        operation: &'static str,
        code: Option<i32>,
        output: String,
    },
    /// Output was not a single 40-character hex id.
    BadOutput {
        operation: &'static str,
        output: String,
    },
}

impl fmt::Display for GitCliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadArgument { got } => write!(f, "expected a hash, got '{got}'"),
            Self::Spawn { err } => write!(f, "failed to run git: {err}"),
            Self::Failed {
                operation,
                code,
                output,
            } => match code {
                Some(code) => {
                    write!(f, "git {operation} failed with exit code {code}: {output}")
                }
                None => write!(f, "git {operation} failed: {output}"),
            },
            Self::BadOutput { operation, output } => {
                write!(f, "expected a hash to be returned from {operation}, got '{output}'")
            }
        }
    }
}

impl std::error::Error for GitCliError {}

/// Runs the two merge operations against a repository working directory.
#[derive(Clone, Debug)]
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    /// Creates a shim running `git` inside `repo_path`.
    #[must_use]
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// `git merge-base <a> <b>`: the best common ancestor.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
        self.run("merge-base", a, b)
    }

    /// `git merge-tree <a> <b>`: the tree id of the deterministic
    /// three-way merge of the two commits.
    pub fn merge_tree(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
        self.run("merge-tree", a, b)
    }

    fn run(
        &self,
        operation: &'static str,
        a: &ObjectId,
        b: &ObjectId,
    ) -> Result<ObjectId, GitCliError> {
        let a = checked_hex(a)?;
        let b = checked_hex(b)?;
        run_git(&self.repo_path, operation, &a, &b)
    }
}

fn checked_hex(id: &ObjectId) -> Result<String, GitCliError> {
    let hex = id.to_hex();
    if !is_hex_sha1(&hex) {
        return Err(GitCliError::BadArgument { got: hex });
    }
    Ok(hex)
}

fn run_git(
    repo_path: &Path,
    operation: &'static str,
    a: &str,
    b: &str,
) -> Result<ObjectId, GitCliError> {
    let output = Command::new("git")
        .arg(operation)
        .arg(a)
        .arg(b)
        .current_dir(repo_path)
        .output()
        .map_err(|err| GitCliError::Spawn { err })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(GitCliError::Failed {
            operation,
            code: output.status.code(),
            output: stdout,
        });
    }

    let result = stdout.trim_end_matches(['\r', '\n']);
    if !is_hex_sha1(result) {
        return Err(GitCliError::BadOutput {
            operation,
            output: result.to_owned(),
        });
    }

    Ok(ObjectId::from_hex(result).expect("validated hex"))
}

/// The merge operations the verifier needs; implemented by [`GitCli`] in
/// production and by in-memory fakes in tests.
pub trait MergeOps {
    /// Best common ancestor of two commits.
    fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError>;
    /// Tree id of the deterministic three-way merge of two commits.
    fn merge_tree(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError>;
}

impl MergeOps for GitCli {
    fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
        Self::merge_base(self, a, b)
    }

    fn merge_tree(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
        Self::merge_tree(self, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_argument_is_rejected() {
        let id = ObjectId::sha256([0xaa; 32]);
        assert!(matches!(
            checked_hex(&id),
            Err(GitCliError::BadArgument { .. })
        ));
    }

    #[test]
    fn sha1_argument_passes_guard() {
        let id = ObjectId::sha1([0xab; 20]);
        assert_eq!(checked_hex(&id).unwrap(), "ab".repeat(20));
    }
}

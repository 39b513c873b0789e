//! Error types for repository policy verification.
//!
//! All verification errors are fatal: they bubble to the caller and the
//! run exits nonzero. Variants carry enough context for a human
//! diagnostic; the rendered text is not stable for machine parsing.

use std::fmt;
use std::io;

use crate::git::{DigestKind, ObjectId, StateError};
use crate::hashing::HashError;

use super::git_cli::GitCliError;

/// Fatal verification failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum VerifyError {
    /// Recomputed SHA-1 differs from the stored identity.
    IntegrityFailure { id: ObjectId },
    /// A commit has more than two parents.
    TooManyParents { id: ObjectId, count: usize },
    /// An after entry's SHA-1 and SHA-256 digests matched inconsistently.
    AfterMismatch { id: ObjectId },
    /// Declared after-frontier commits are missing from the repository.
    AfterNotFound {
        kind: DigestKind,
        missing: Vec<String>,
    },
    /// A commit that must be signed carries no signature.
    UnsignedCommit { id: ObjectId },
    /// A tag that must be signed is lightweight or unsigned.
    UnsignedTag { name: String, lightweight: bool },
    /// A signature block with an unrecognized prefix.
    UnknownSignatureType { context: String },
    /// A signature failed to parse or verify.
    SignatureInvalid { context: String, detail: String },
    /// Committer/author/tagger email not present in the policy.
    UnknownIdentity { email: String, context: String },
    /// A forge-committed commit violates the forge rules.
    ForgePolicyViolation { id: ObjectId, detail: String },
    /// `git merge-tree` disagreed with a merge commit's tree.
    MergeContentDrift { id: ObjectId, detail: String },
    /// A protected branch violates the merge/up-to-date/connectivity rules.
    ProtectedBranchMalformed { branch: String, detail: String },
    /// A previously recorded tag resolves to a different identity.
    TagMutated {
        ref_name: String,
        was: String,
        now: String,
    },
    /// A previously recorded tag no longer exists.
    TagDeleted { ref_name: String, was: String },
    /// A previously recorded protected branch no longer exists, or its new
    /// tip is not a first-parent descendant of the recorded tip.
    BranchDeleted { ref_name: String, was: String },
    /// Local-state snapshot is internally inconsistent.
    LocalStateMalformed { detail: String },
    /// A tag's internal name does not match its ref name.
    TagNameMismatch { ref_name: String, tag_name: String },
    /// An exempt tag's recorded digest does not match the observed one.
    ExemptTagMismatch {
        ref_name: String,
        kind: DigestKind,
        got: String,
        expected: String,
    },
    /// A named target (commit, tag, branch) was not found.
    TargetNotFound {
        what: &'static str,
        name: String,
    },
    /// The target commit is not anchored to the configured after frontier.
    NotConnectedToAfter { id: ObjectId },
    /// HEAD or a branch tip does not point where the options require.
    TargetMismatch { detail: String },
    /// A referenced commit is absent from the state maps.
    CommitMissing { id: ObjectId },
    /// Re-hashing failed.
    Hashing(HashError),
    /// State loading failed.
    State(StateError),
    /// A git subprocess failed.
    Git(GitCliError),
    /// Local-state I/O failed.
    Io(io::Error),
    /// Local-state JSON failed to encode or decode.
    Json(serde_json::Error),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntegrityFailure { id } => write!(f, "failed to verify hash {id}"),
            Self::TooManyParents { id, count } => {
                write!(f, "up to two parents are allowed, commit '{id}' has {count}")
            }
            Self::AfterMismatch { id } => {
                write!(f, "commit {id} matched after SHA-1 or SHA-256 but not both")
            }
            Self::AfterNotFound { kind, missing } => write!(
                f,
                "after {} commit(s) not found in repo: {}",
                match kind {
                    DigestKind::Sha1 => "SHA-1",
                    DigestKind::Sha256 => "SHA-256",
                },
                missing.join(",")
            ),
            Self::UnsignedCommit { id } => write!(f, "unsigned commit: {id}"),
            Self::UnsignedTag { name, lightweight } => {
                if *lightweight {
                    write!(f, "tag '{name}' is lightweight, but signing is required")
                } else {
                    write!(f, "unsigned annotated tag: {name}")
                }
            }
            Self::UnknownSignatureType { context } => {
                write!(f, "unknown signature type: {context}")
            }
            Self::SignatureInvalid { context, detail } => {
                write!(f, "failed to validate {context}: {detail}")
            }
            Self::UnknownIdentity { email, context } => {
                write!(f, "no maintainer or contributor with email '{email}' for {context}")
            }
            Self::ForgePolicyViolation { id, detail } => {
                write!(f, "forge policy violation for {id}: {detail}")
            }
            Self::MergeContentDrift { id, detail } => {
                write!(f, "merge commit {id} has content changes: {detail}")
            }
            Self::ProtectedBranchMalformed { branch, detail } => {
                write!(f, "protected branch '{branch}': {detail}")
            }
            Self::TagMutated { ref_name, was, now } => {
                write!(f, "tag '{ref_name}' hash has changed from {was} to {now}")
            }
            Self::TagDeleted { ref_name, was } => {
                write!(f, "tag '{ref_name}' has been deleted, was {was}")
            }
            Self::BranchDeleted { ref_name, was } => {
                write!(f, "protected branch '{ref_name}' has been deleted, was {was}")
            }
            Self::LocalStateMalformed { detail } => write!(f, "local state malformed: {detail}"),
            Self::TagNameMismatch { ref_name, tag_name } => {
                write!(f, "tag ref '{ref_name}' does not match name '{tag_name}'")
            }
            Self::ExemptTagMismatch {
                ref_name,
                kind,
                got,
                expected,
            } => write!(
                f,
                "wrong hash.{} for exempted tag '{ref_name}', got {got}, expected {expected}",
                match kind {
                    DigestKind::Sha1 => "sha1",
                    DigestKind::Sha256 => "sha256",
                }
            ),
            Self::TargetNotFound { what, name } => write!(f, "target {what} '{name}' not found"),
            Self::NotConnectedToAfter { id } => {
                write!(f, "commit '{id}' not connected to after")
            }
            Self::TargetMismatch { detail } => f.write_str(detail),
            Self::CommitMissing { id } => write!(f, "did not find commit {id}"),
            Self::Hashing(err) => write!(f, "{err}"),
            Self::State(err) => write!(f, "{err}"),
            Self::Git(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "local state I/O error: {err}"),
            Self::Json(err) => write!(f, "local state JSON error: {err}"),
        }
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hashing(err) => Some(err),
            Self::State(err) => Some(err),
            Self::Git(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HashError> for VerifyError {
    fn from(err: HashError) -> Self {
        Self::Hashing(err)
    }
}

impl From<StateError> for VerifyError {
    fn from(err: StateError) -> Self {
        Self::State(err)
    }
}

impl From<GitCliError> for VerifyError {
    fn from(err: GitCliError) -> Self {
        Self::Git(err)
    }
}

impl From<io::Error> for VerifyError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for VerifyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

//! Errors from object re-hashing.

use std::fmt;

use crate::git::{EntryMode, ObjectId, ObjectKind};

/// Failure while re-serializing or digesting an object.
#[derive(Debug)]
#[non_exhaustive]
pub enum HashError {
    /// A referenced identity is absent from the repository state.
    ObjectNotFound { kind: ObjectKind, id: ObjectId },
    /// A tree entry's mode cannot be hashed (gitlink).
    UnsupportedMode { mode: EntryMode, tree: ObjectId },
    /// A commit signature's last line is not empty.
    MalformedSignature { last_line: String },
    /// The digest algorithm produces a width `ObjectId` cannot hold.
    UnsupportedDigestWidth { bytes: usize },
    /// The parent graph is not acyclic; only possible when advertised ids
    /// do not hash to their content.
    GraphCycle { id: ObjectId },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotFound { kind, id } => write!(f, "{kind} {id} not found"),
            Self::UnsupportedMode { mode, tree } => {
                write!(f, "entry mode {} not supported in tree {tree}", mode.octal_text())
            }
            Self::MalformedSignature { last_line } => write!(
                f,
                "expected empty last line of signature, got '{last_line}'"
            ),
            Self::UnsupportedDigestWidth { bytes } => {
                write!(f, "digest width {bytes} not supported (expected 20 or 32)")
            }
            Self::GraphCycle { id } => write!(f, "commit graph cycle through {id}"),
        }
    }
}

impl std::error::Error for HashError {}

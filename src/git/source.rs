//! Repository access seam.
//!
//! The toolkit does not reimplement Git's object store. A [`RepoSource`]
//! supplies already-decoded-from-storage (inflated) object payloads with
//! their type and id, the reference list, and HEAD. Backends are expected
//! to be read-only for the duration of a run.

use std::fmt;
use std::io;

use super::object::ObjectKind;
use super::object_id::{DigestKind, ObjectId};
use super::refs::Ref;

/// One encoded object as stored: type tag, advertised id, raw payload
/// (without the `"<type> <len>\0"` framing header).
#[derive(Clone, Debug)]
pub struct EncodedObject {
    pub kind: ObjectKind,
    pub id: ObjectId,
    pub data: Vec<u8>,
}

/// Errors surfaced by a repository backend.
#[derive(Debug)]
#[non_exhaustive]
pub enum SourceError {
    /// I/O failure reading the backing store.
    Io(io::Error),
    /// Backend-specific failure.
    Backend { detail: String },
    /// The repository has no resolvable HEAD.
    NoHead,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "repository I/O error: {err}"),
            Self::Backend { detail } => write!(f, "repository backend error: {detail}"),
            Self::NoHead => f.write_str("repository has no HEAD"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Read access to a repository's objects and references.
///
/// The object iterator may visit the same id more than once (packed and
/// loose copies); consumers deduplicate by id.
pub trait RepoSource {
    /// Iterates over every encoded object in the repository.
    fn objects(&self) -> Box<dyn Iterator<Item = Result<EncodedObject, SourceError>> + '_>;

    /// Lists every reference (tags, local and remote branches).
    fn references(&self) -> Result<Vec<Ref>, SourceError>;

    /// Resolves HEAD to a commit id.
    fn head(&self) -> Result<ObjectId, SourceError>;

    /// The repository's object-id algorithm.
    fn digest_kind(&self) -> DigestKind {
        DigestKind::Sha1
    }
}

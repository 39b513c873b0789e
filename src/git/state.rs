//! One-pass repository state loader.
//!
//! Decodes every encoded object into four by-id maps plus an inverted
//! index from tag target to tag ids. Loading is strict: a repository whose
//! objects fail to decode is rejected here rather than producing partial
//! state.
//!
//! # Invariants
//! - Exactly one pass over the source's object iterator.
//! - Duplicate ids are skipped (packed + loose copies of the same object).
//! - The state is read-only after loading.

use std::fmt;

use ahash::{AHashMap, AHashSet};

use super::decode::{decode_object, DecodeError};
use super::object::{AnnotatedTag, Blob, Commit, GitObject, Tree};
use super::object_id::ObjectId;
use super::source::{RepoSource, SourceError};

/// Errors from state loading.
#[derive(Debug)]
#[non_exhaustive]
pub enum StateError {
    /// An object failed to decode.
    Decode { id: ObjectId, err: DecodeError },
    /// The backend failed while iterating.
    Source(SourceError),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { id, err } => write!(f, "failed to decode object {id}: {err}"),
            Self::Source(err) => write!(f, "failed to load repository state: {err}"),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode { err, .. } => Some(err),
            Self::Source(err) => Some(err),
        }
    }
}

impl From<SourceError> for StateError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

/// Every decoded object in a repository, indexed by identity.
#[derive(Debug, Default)]
pub struct RepoState {
    pub blobs: AHashMap<ObjectId, Blob>,
    pub trees: AHashMap<ObjectId, Tree>,
    pub commits: AHashMap<ObjectId, Commit>,
    pub tags: AHashMap<ObjectId, AnnotatedTag>,
    /// Tag-target commit id to the annotated tags pointing at it.
    pub tags_by_target: AHashMap<ObjectId, Vec<ObjectId>>,
}

impl RepoState {
    /// Loads the full object graph from a source.
    ///
    /// # Errors
    /// Fails on the first backend or decode error.
    pub fn load(source: &dyn RepoSource) -> Result<Self, StateError> {
        let format = source.digest_kind();
        let mut state = Self::default();
        let mut seen: AHashSet<ObjectId> = AHashSet::new();

        for encoded in source.objects() {
            let encoded = encoded?;
            if !seen.insert(encoded.id) {
                continue;
            }

            let id = encoded.id;
            let decoded = decode_object(encoded.kind, &encoded.data, format)
                .map_err(|err| StateError::Decode { id, err })?;
            debug_assert_eq!(decoded.kind(), encoded.kind);

            match decoded {
                GitObject::Blob(blob) => {
                    state.blobs.insert(id, blob);
                }
                GitObject::Tree(tree) => {
                    state.trees.insert(id, tree);
                }
                GitObject::Commit(commit) => {
                    state.commits.insert(id, commit);
                }
                GitObject::Tag(tag) => {
                    state.tags.insert(id, tag);
                }
            }
        }

        for (id, tag) in &state.tags {
            state
                .tags_by_target
                .entry(tag.target)
                .or_default()
                .push(*id);
        }

        Ok(state)
    }

    /// Number of objects across all four maps.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.blobs.len() + self.trees.len() + self.commits.len() + self.tags.len()
    }
}

//! In-memory repository backend.
//!
//! Stores encoded objects and references in plain vectors. Ids are computed
//! with SHA-1 over the framed canonical serialization on insert, so a
//! fixture built through the `add_*` helpers is internally consistent: the
//! advertised ids really are the Git ids of the stored bytes. This is the
//! reference [`RepoSource`] implementation and the backend used throughout
//! the test suite.

use sha1::{Digest, Sha1};

use super::encode::{encode_commit, encode_tag, encode_tree, frame};
use super::object::{AnnotatedTag, Commit, ObjectKind, Tree};
use super::object_id::{DigestKind, ObjectId};
use super::refs::Ref;
use super::source::{EncodedObject, RepoSource, SourceError};

/// A repository held entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    objects: Vec<EncodedObject>,
    references: Vec<Ref>,
    head: Option<ObjectId>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a blob; returns its SHA-1 id.
    pub fn add_blob(&mut self, data: &[u8]) -> ObjectId {
        self.push(ObjectKind::Blob, data.to_vec())
    }

    /// Stores a tree; returns its SHA-1 id.
    pub fn add_tree(&mut self, tree: &Tree) -> ObjectId {
        self.push(ObjectKind::Tree, encode_tree(tree))
    }

    /// Stores a commit; returns its SHA-1 id.
    ///
    /// # Panics
    /// Panics if the commit's signature text is not newline-terminated;
    /// fixtures are expected to be well-formed.
    pub fn add_commit(&mut self, commit: &Commit) -> ObjectId {
        let payload = encode_commit(commit).expect("fixture commit signature must be well-formed");
        self.push(ObjectKind::Commit, payload)
    }

    /// Stores an annotated tag; returns its SHA-1 id.
    pub fn add_tag(&mut self, tag: &AnnotatedTag) -> ObjectId {
        self.push(ObjectKind::Tag, encode_tag(tag))
    }

    /// Stores a pre-encoded payload under its claimed id, bypassing the
    /// id computation. Lets tests model tampered repositories whose
    /// advertised ids do not hash to their content.
    pub fn add_raw(&mut self, kind: ObjectKind, id: ObjectId, data: Vec<u8>) {
        self.objects.push(EncodedObject { kind, id, data });
    }

    /// Adds a reference.
    pub fn add_ref(&mut self, name: impl Into<String>, target: ObjectId) {
        self.references.push(Ref::new(name, target));
    }

    /// Sets the HEAD commit.
    pub fn set_head(&mut self, id: ObjectId) {
        self.head = Some(id);
    }

    fn push(&mut self, kind: ObjectKind, payload: Vec<u8>) -> ObjectId {
        let framed = frame(kind, &payload);
        let digest = Sha1::digest(&framed);
        let id = ObjectId::from_digest(&digest).expect("SHA-1 digest is 20 bytes");
        self.objects.push(EncodedObject {
            kind,
            id,
            data: payload,
        });
        id
    }
}

impl RepoSource for MemorySource {
    fn objects(&self) -> Box<dyn Iterator<Item = Result<EncodedObject, SourceError>> + '_> {
        Box::new(self.objects.iter().cloned().map(Ok))
    }

    fn references(&self) -> Result<Vec<Ref>, SourceError> {
        Ok(self.references.clone())
    }

    fn head(&self) -> Result<ObjectId, SourceError> {
        self.head.ok_or(SourceError::NoHead)
    }

    fn digest_kind(&self) -> DigestKind {
        DigestKind::Sha1
    }
}

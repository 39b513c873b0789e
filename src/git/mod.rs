//! Git object model, decoding, and repository state.
//!
//! The crate never touches Git's object store directly: a [`RepoSource`]
//! backend supplies encoded objects and references, and [`RepoState::load`]
//! turns one pass over them into by-identity maps that the re-hasher,
//! verifier, and search pipeline all read from.
//!
//! # Invariants
//! - Objects are referenced by [`ObjectId`] value, never by location.
//! - Decoded objects re-serialize byte-exactly (`decode` ∘ `encode` = id).
//! - State is immutable once loaded.

pub mod decode;
pub mod encode;
pub mod memory;
pub mod object;
pub mod object_id;
pub mod refs;
pub mod source;
pub mod state;

pub use decode::DecodeError;
pub use memory::MemorySource;
pub use object::{
    AnnotatedTag, Blob, Commit, EntryMode, GitObject, ObjectKind, Person, Tree, TreeEntry,
};
pub use object_id::{DigestKind, ObjectId};
pub use refs::Ref;
pub use source::{EncodedObject, RepoSource, SourceError};
pub use state::{RepoState, StateError};

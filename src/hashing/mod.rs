//! Content-addressable re-hashing of Git objects.
//!
//! Reproduces Git's canonical object serialization and digests it under a
//! caller-supplied algorithm. Under SHA-1 the result must equal the
//! object's advertised id — the verifier leans on this as an integrity
//! self-check. Under any other algorithm the result is the object's
//! identity in that digest space, with every internal reference (tree ids,
//! parent ids, tag targets) recursively recomputed under the same
//! algorithm.
//!
//! # Memoization
//! One memo table per object kind, per instance. A [`GitHasher`] is not
//! thread-safe; create one per worker.
//!
//! # Recursion
//! Commit ancestry is walked with an explicit work stack so repositories
//! with very deep histories cannot overflow the call stack. Tree descent
//! recurses; its depth is bounded by path depth, not history length.

use std::marker::PhantomData;

use ahash::{AHashMap, AHashSet};
use digest::Digest;

use crate::git::encode::{push_folded_signature, push_id_line, push_person_line};
use crate::git::{Commit, EntryMode, ObjectId, ObjectKind, RepoState};

mod errors;

pub use errors::HashError;

/// Re-hashes repository objects under digest algorithm `D`.
///
/// Results are [`ObjectId`]s, so `D` must produce 20- or 32-byte digests
/// (SHA-1, SHA-256, or anything else of those widths).
pub struct GitHasher<'a, D: Digest> {
    state: &'a RepoState,
    blobs: AHashMap<ObjectId, ObjectId>,
    trees: AHashMap<ObjectId, ObjectId>,
    commits: AHashMap<ObjectId, ObjectId>,
    tags: AHashMap<ObjectId, ObjectId>,
    _algorithm: PhantomData<D>,
}

impl<'a, D: Digest> GitHasher<'a, D> {
    /// Creates a hasher over loaded repository state.
    #[must_use]
    pub fn new(state: &'a RepoState) -> Self {
        Self {
            state,
            blobs: AHashMap::new(),
            trees: AHashMap::new(),
            commits: AHashMap::new(),
            tags: AHashMap::new(),
            _algorithm: PhantomData,
        }
    }

    /// Digest of the blob with identity `id`.
    ///
    /// # Errors
    /// `ObjectNotFound` if the id is not a blob in the state.
    pub fn blob_sum(&mut self, id: ObjectId) -> Result<ObjectId, HashError> {
        if let Some(&sum) = self.blobs.get(&id) {
            return Ok(sum);
        }

        let blob = self
            .state
            .blobs
            .get(&id)
            .ok_or(HashError::ObjectNotFound {
                kind: ObjectKind::Blob,
                id,
            })?;

        let sum = digest_framed::<D>(ObjectKind::Blob, &blob.data)?;
        self.blobs.insert(id, sum);
        Ok(sum)
    }

    /// Digest of the tree with identity `id`, recursively digesting every
    /// referenced subtree and blob.
    ///
    /// # Errors
    /// `ObjectNotFound` for missing children; `UnsupportedMode` for entry
    /// modes outside the hashable set (gitlinks).
    pub fn tree_sum(&mut self, id: ObjectId) -> Result<ObjectId, HashError> {
        if let Some(&sum) = self.trees.get(&id) {
            return Ok(sum);
        }

        let state = self.state;
        let tree = state.trees.get(&id).ok_or(HashError::ObjectNotFound {
            kind: ObjectKind::Tree,
            id,
        })?;

        let mut payload = Vec::new();
        for entry in &tree.entries {
            let child = if entry.mode.is_tree() {
                self.tree_sum(entry.id)?
            } else if entry.mode.is_file() || entry.mode == EntryMode::Symlink {
                self.blob_sum(entry.id)?
            } else {
                return Err(HashError::UnsupportedMode {
                    mode: entry.mode,
                    tree: id,
                });
            };

            payload.extend_from_slice(entry.mode.octal_text().as_bytes());
            payload.push(b' ');
            payload.extend_from_slice(entry.name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(child.as_slice());
        }

        let sum = digest_framed::<D>(ObjectKind::Tree, &payload)?;
        self.trees.insert(id, sum);
        Ok(sum)
    }

    /// Digest of the commit with identity `id`.
    ///
    /// Ancestors are resolved iteratively; each commit in the reachable
    /// history is digested at most once per hasher instance.
    ///
    /// # Errors
    /// `ObjectNotFound` for missing commits or trees; `MalformedSignature`
    /// if a signature block is not newline-terminated; `GraphCycle` if the
    /// parent graph is not acyclic (only possible with tampered ids).
    pub fn commit_sum(&mut self, id: ObjectId) -> Result<ObjectId, HashError> {
        if let Some(&sum) = self.commits.get(&id) {
            return Ok(sum);
        }

        let state = self.state;
        let mut stack = vec![id];
        let mut visiting: AHashSet<ObjectId> = AHashSet::new();
        visiting.insert(id);

        while let Some(&current) = stack.last() {
            if self.commits.contains_key(&current) {
                stack.pop();
                visiting.remove(&current);
                continue;
            }

            let commit = state
                .commits
                .get(&current)
                .ok_or(HashError::ObjectNotFound {
                    kind: ObjectKind::Commit,
                    id: current,
                })?;

            let mut blocked = false;
            for parent in &commit.parents {
                if self.commits.contains_key(parent) {
                    continue;
                }
                if !visiting.insert(*parent) {
                    return Err(HashError::GraphCycle { id: *parent });
                }
                stack.push(*parent);
                blocked = true;
            }
            if blocked {
                continue;
            }

            let sum = self.commit_payload_sum(commit)?;
            self.commits.insert(current, sum);
            stack.pop();
            visiting.remove(&current);
        }

        Ok(self.commits[&id])
    }

    /// Digest of the annotated tag with identity `id`.
    ///
    /// # Errors
    /// As [`Self::commit_sum`] for the target, plus `ObjectNotFound` if the
    /// tag itself is absent.
    pub fn tag_sum(&mut self, id: ObjectId) -> Result<ObjectId, HashError> {
        if let Some(&sum) = self.tags.get(&id) {
            return Ok(sum);
        }

        let state = self.state;
        let tag = state.tags.get(&id).ok_or(HashError::ObjectNotFound {
            kind: ObjectKind::Tag,
            id,
        })?;

        let target = self.commit_sum(tag.target)?;

        let mut out = String::new();
        push_id_line(&mut out, "object", &target);
        out.push_str("type ");
        out.push_str(tag.target_kind.as_str());
        out.push('\n');
        out.push_str("tag ");
        out.push_str(&tag.name);
        out.push('\n');
        push_person_line(&mut out, "tagger", &tag.tagger);
        out.push('\n');
        out.push_str(&tag.message);
        if let Some(signature) = &tag.signature {
            out.push_str(signature);
        }

        let sum = digest_framed::<D>(ObjectKind::Tag, out.as_bytes())?;
        self.tags.insert(id, sum);
        Ok(sum)
    }

    /// Builds and digests a commit payload. Parents must already be
    /// memoized; the tree is digested on demand.
    fn commit_payload_sum(&mut self, commit: &Commit) -> Result<ObjectId, HashError> {
        let tree = self.tree_sum(commit.tree)?;

        let mut out = String::new();
        push_id_line(&mut out, "tree", &tree);
        for parent in &commit.parents {
            let parent_sum = self.commits[parent];
            push_id_line(&mut out, "parent", &parent_sum);
        }
        push_person_line(&mut out, "author", &commit.author);
        push_person_line(&mut out, "committer", &commit.committer);

        if let Some(signature) = &commit.signature {
            push_folded_signature(&mut out, signature).map_err(|err| {
                HashError::MalformedSignature {
                    last_line: err.last_line,
                }
            })?;
        }

        out.push('\n');
        out.push_str(&commit.message);

        digest_framed::<D>(ObjectKind::Commit, out.as_bytes())
    }
}

/// Digests `"<type> <len>\0" || payload` under `D`.
fn digest_framed<D: Digest>(kind: ObjectKind, payload: &[u8]) -> Result<ObjectId, HashError> {
    let mut hasher = D::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);

    let digest = hasher.finalize();
    ObjectId::from_digest(&digest).ok_or(HashError::UnsupportedDigestWidth {
        bytes: digest.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::encode::frame;
    use crate::git::{AnnotatedTag, MemorySource, Person, Tree, TreeEntry};
    use sha1::Sha1;
    use sha2::Sha256;

    fn person(email: &str) -> Person {
        Person {
            name: "Alice".into(),
            email: email.into(),
            timestamp: 1_700_000_000,
            tz: "+0000".into(),
        }
    }

    fn small_repo() -> (MemorySource, ObjectId, ObjectId, ObjectId, ObjectId) {
        let mut source = MemorySource::new();
        let blob = source.add_blob(b"test content\n");
        let tree = source.add_tree(&Tree {
            entries: vec![TreeEntry {
                mode: EntryMode::Regular,
                name: "file.txt".into(),
                id: blob,
            }],
        });
        let commit = source.add_commit(&Commit {
            tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "hi\n".into(),
        });
        let tag = source.add_tag(&AnnotatedTag {
            target: commit,
            target_kind: ObjectKind::Commit,
            name: "v1.0.0".into(),
            tagger: person("a@x"),
            signature: None,
            message: "release\n".into(),
        });
        (source, blob, tree, commit, tag)
    }

    #[test]
    fn sha1_sums_equal_stored_identities() {
        let (source, blob, tree, commit, tag) = small_repo();
        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);

        assert_eq!(hasher.blob_sum(blob).unwrap(), blob);
        assert_eq!(hasher.tree_sum(tree).unwrap(), tree);
        assert_eq!(hasher.commit_sum(commit).unwrap(), commit);
        assert_eq!(hasher.tag_sum(tag).unwrap(), tag);
    }

    #[test]
    fn known_blob_vector() {
        let mut source = MemorySource::new();
        let blob = source.add_blob(b"test content\n");
        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);

        // `echo 'test content' | git hash-object --stdin`
        assert_eq!(
            hasher.blob_sum(blob).unwrap().to_string(),
            "d670460b4b4aece5915caf5c68d12f560a9fe3e4"
        );
    }

    #[test]
    fn canonical_commit_payload_shape() {
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let commit = Commit {
            tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "hi\n".into(),
        };
        let commit_id = source.add_commit(&commit);

        let payload = format!(
            "tree {tree}\nauthor Alice <a@x> 1700000000 +0000\ncommitter Alice <a@x> 1700000000 +0000\n\nhi\n"
        );
        let framed = frame(ObjectKind::Commit, payload.as_bytes());
        let expected_header = format!("commit {}\0", payload.len());
        assert!(framed.starts_with(expected_header.as_bytes()));

        let manual = ObjectId::from_digest(&Sha1::digest(&framed)).unwrap();
        assert_eq!(manual, commit_id);

        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert_eq!(hasher.commit_sum(commit_id).unwrap(), commit_id);
    }

    #[test]
    fn sha256_sum_matches_manual_construction() {
        let (source, _blob, _tree, commit, _tag) = small_repo();
        let state = RepoState::load(&source).unwrap();

        let mut sha256 = GitHasher::<Sha256>::new(&state);
        let commit_obj = &state.commits[&commit];

        let tree256 = sha256.tree_sum(commit_obj.tree).unwrap();
        let payload = format!(
            "tree {tree256}\nauthor {}\ncommitter {}\n\n{}",
            commit_obj.author, commit_obj.committer, commit_obj.message
        );
        let framed = frame(ObjectKind::Commit, payload.as_bytes());
        let manual = ObjectId::from_digest(&Sha256::digest(&framed)).unwrap();

        assert_eq!(sha256.commit_sum(commit).unwrap(), manual);
        assert_eq!(manual.kind(), crate::git::DigestKind::Sha256);
    }

    #[test]
    fn signed_commit_self_check() {
        let signature =
            "-----BEGIN SSH SIGNATURE-----\nU1NIU0lHAAAA\n-----END SSH SIGNATURE-----\n";
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let commit = source.add_commit(&Commit {
            tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: Some(signature.into()),
            message: "signed\n".into(),
        });

        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert_eq!(hasher.commit_sum(commit).unwrap(), commit);
    }

    #[test]
    fn merge_history_hashes_iteratively() {
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());

        let root = source.add_commit(&Commit {
            tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "root\n".into(),
        });
        let left = source.add_commit(&Commit {
            tree,
            parents: vec![root],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "left\n".into(),
        });
        let right = source.add_commit(&Commit {
            tree,
            parents: vec![root],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "right\n".into(),
        });
        let merge = source.add_commit(&Commit {
            tree,
            parents: vec![left, right],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "merge\n".into(),
        });

        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert_eq!(hasher.commit_sum(merge).unwrap(), merge);
        // Root reached through both sides; memo kept it to one computation.
        assert_eq!(hasher.commit_sum(root).unwrap(), root);
    }

    #[test]
    fn missing_object_reports_kind_and_id() {
        let mut source = MemorySource::new();
        let missing_tree = ObjectId::sha1([0x77; 20]);
        let commit = source.add_commit(&Commit {
            tree: missing_tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: None,
            message: "m\n".into(),
        });

        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert!(matches!(
            hasher.commit_sum(commit),
            Err(HashError::ObjectNotFound {
                kind: ObjectKind::Tree,
                id
            }) if id == missing_tree
        ));
    }

    #[test]
    fn gitlink_entry_is_unsupported() {
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree {
            entries: vec![TreeEntry {
                mode: EntryMode::Submodule,
                name: "vendored".into(),
                id: ObjectId::sha1([0x66; 20]),
            }],
        });

        let state = RepoState::load(&source).unwrap();
        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert!(matches!(
            hasher.tree_sum(tree),
            Err(HashError::UnsupportedMode {
                mode: EntryMode::Submodule,
                ..
            })
        ));
    }

    #[test]
    fn unterminated_signature_is_malformed() {
        let mut state = RepoState::default();
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let loaded = RepoState::load(&source).unwrap();
        state.trees = loaded.trees;

        let bad = Commit {
            tree,
            parents: vec![],
            author: person("a@x"),
            committer: person("a@x"),
            signature: Some("-----BEGIN SSH SIGNATURE-----\nno newline".into()),
            message: "m\n".into(),
        };
        let id = ObjectId::sha1([0x01; 20]);
        state.commits.insert(id, bad);

        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert!(matches!(
            hasher.commit_sum(id),
            Err(HashError::MalformedSignature { .. })
        ));
    }

    #[test]
    fn parent_cycle_is_detected() {
        let mut state = RepoState::default();
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        state.trees = RepoState::load(&source).unwrap().trees;

        let a = ObjectId::sha1([0xaa; 20]);
        let b = ObjectId::sha1([0xbb; 20]);
        state.commits.insert(
            a,
            Commit {
                tree,
                parents: vec![b],
                author: person("a@x"),
                committer: person("a@x"),
                signature: None,
                message: "a\n".into(),
            },
        );
        state.commits.insert(
            b,
            Commit {
                tree,
                parents: vec![a],
                author: person("a@x"),
                committer: person("a@x"),
                signature: None,
                message: "b\n".into(),
            },
        );

        let mut hasher = GitHasher::<Sha1>::new(&state);
        assert!(matches!(
            hasher.commit_sum(a),
            Err(HashError::GraphCycle { .. })
        ));
    }
}

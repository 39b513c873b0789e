//! Candidate after-frontier entries.
//!
//! A childless commit (no other commit lists it as a parent) is a branch
//! tip; tips are the natural candidates when bootstrapping a config's
//! `after` list from an existing repository.

use sha2::Sha256;

use crate::git::RepoState;
use crate::hashing::GitHasher;
use crate::stdx::KeySet;

use super::config::After;
use super::errors::VerifyError;

/// Lists every childless commit as an `after` candidate, sorted by SHA-1
/// for stable output. With `with_sha256` the dual digest is recomputed and
/// included.
pub fn after_candidates(
    state: &RepoState,
    with_sha256: bool,
) -> Result<Vec<After>, VerifyError> {
    let mut pointed_to: KeySet<crate::git::ObjectId> = KeySet::new();
    for commit in state.commits.values() {
        for parent in &commit.parents {
            pointed_to.insert(*parent);
        }
    }

    let mut sha256 = GitHasher::<Sha256>::new(state);

    let mut candidates = Vec::new();
    for id in state.commits.keys() {
        if pointed_to.contains(id) {
            continue;
        }

        let sha256_hex = if with_sha256 {
            Some(sha256.commit_sum(*id)?.to_hex())
        } else {
            None
        };

        candidates.push(After {
            sha1: Some(id.to_hex()),
            sha256: sha256_hex,
            branch: None,
        });
    }

    candidates.sort_by(|a, b| a.sha1.cmp(&b.sha1));
    Ok(candidates)
}

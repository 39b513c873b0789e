//! Local-state continuity between runs.
//!
//! After a successful verification the toolkit persists a snapshot of
//! every tag and protected-branch tip under both digest algorithms. The
//! next run compares the fresh repository against the snapshot before
//! overwriting it:
//!
//! - a recorded tag must still exist with identical digests (any change,
//!   including deliberate re-tagging, is fatal until the exemption list is
//!   rotated);
//! - a recorded protected branch must still exist and its new tip must be
//!   a first-parent descendant of the recorded tip, with the SHA-256
//!   digest recomputed and cross-checked;
//! - deletions of either are fatal.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::git::refs::{branch_name, Ref, TAGS_PREFIX};
use crate::git::{ObjectId, RepoState};
use crate::hashing::GitHasher;
use crate::stdx::KeySet;

use super::config::Digests;
use super::errors::VerifyError;
use super::repo_config::RepoConfig;

/// Time source for snapshot stamps. The system clock in production; tests
/// substitute a fixed value.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn unix_now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// One recorded ref with its dual digests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub hash: Digests,
}

/// The persisted snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalState {
    pub tags: Vec<RecordedRef>,
    pub branches: Vec<RecordedRef>,
    /// Unix time the snapshot was taken.
    #[serde(
        rename = "savedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub saved_at: Option<i64>,
}

impl LocalState {
    /// Reads a snapshot; `Ok(None)` when none has been saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>, VerifyError> {
        match std::fs::read(path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the snapshot, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), VerifyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// Default snapshot location for a repository.
#[must_use]
pub fn local_state_path(home: &Path, forge: &str, org: &str, repo: &str) -> PathBuf {
    home.join(".config")
        .join("gitverify")
        .join(forge)
        .join(org)
        .join(repo)
        .join("local.json")
}

/// Computes the current snapshot: every tag and every protected-branch
/// tip, each under SHA-1 and SHA-256, sorted by ref name descending.
pub fn snapshot(
    state: &RepoState,
    references: &[Ref],
    config: &RepoConfig,
    clock: &dyn Clock,
) -> Result<LocalState, VerifyError> {
    let mut sha256 = GitHasher::<Sha256>::new(state);

    let mut tags = compute_tags(state, references, &mut sha256)?;
    tags.sort_by(|a, b| b.ref_name.cmp(&a.ref_name));

    let mut branches = compute_branches(references, config, &mut sha256)?;
    branches.sort_by(|a, b| b.ref_name.cmp(&a.ref_name));

    Ok(LocalState {
        tags,
        branches,
        saved_at: Some(clock.unix_now()),
    })
}

/// Verifies continuity of a previous snapshot against the repository.
pub fn verify_continuity(
    previous: &LocalState,
    state: &RepoState,
    references: &[Ref],
    config: &RepoConfig,
) -> Result<(), VerifyError> {
    let mut sha256 = GitHasher::<Sha256>::new(state);

    let current_tags = index_by_ref(compute_tags(state, references, &mut sha256)?)?;
    for tag in &previous.tags {
        let Some(current) = current_tags.get(&tag.ref_name) else {
            return Err(VerifyError::TagDeleted {
                ref_name: tag.ref_name.clone(),
                was: tag.hash.sha1.clone().unwrap_or_default(),
            });
        };

        let (old_sha1, new_sha1) = both_set(&tag.hash.sha1, &current.hash.sha1, "tag SHA-1")?;
        let (old_sha256, new_sha256) =
            both_set(&tag.hash.sha256, &current.hash.sha256, "tag SHA-256")?;

        if old_sha1 != new_sha1 {
            return Err(VerifyError::TagMutated {
                ref_name: tag.ref_name.clone(),
                was: old_sha1.to_owned(),
                now: new_sha1.to_owned(),
            });
        }
        if old_sha256 != new_sha256 {
            return Err(VerifyError::TagMutated {
                ref_name: tag.ref_name.clone(),
                was: old_sha256.to_owned(),
                now: new_sha256.to_owned(),
            });
        }
    }

    let current_branches = index_by_ref(compute_branches(references, config, &mut sha256)?)?;
    for branch in &previous.branches {
        let Some(current) = current_branches.get(&branch.ref_name) else {
            return Err(VerifyError::BranchDeleted {
                ref_name: branch.ref_name.clone(),
                was: branch.hash.sha1.clone().unwrap_or_default(),
            });
        };

        let (old_sha1, new_sha1) =
            both_set(&branch.hash.sha1, &current.hash.sha1, "branch SHA-1")?;
        both_set(&branch.hash.sha256, &current.hash.sha256, "branch SHA-256")?;

        check_first_parent_descent(
            state,
            &branch.ref_name,
            old_sha1,
            &branch.hash.sha256,
            new_sha1,
            &mut sha256,
        )?;
    }

    Ok(())
}

/// Walks first-parent history from the new tip looking for the recorded
/// tip, then cross-checks the recorded SHA-256 at the match.
///
/// Only the first parent is followed: changes are expected to be merged
/// into the protected branch or committed to it directly. The recorded
/// commit appearing elsewhere in the graph is not sufficient.
fn check_first_parent_descent(
    state: &RepoState,
    ref_name: &str,
    old_sha1: &str,
    old_sha256: &Option<String>,
    new_sha1: &str,
    sha256: &mut GitHasher<'_, Sha256>,
) -> Result<(), VerifyError> {
    let new_tip = ObjectId::from_hex(new_sha1).ok_or_else(|| VerifyError::LocalStateMalformed {
        detail: format!("bad recorded hash '{new_sha1}'"),
    })?;

    if !state.commits.contains_key(&new_tip) {
        return Err(VerifyError::TargetNotFound {
            what: "commit",
            name: new_sha1.to_owned(),
        });
    }

    let mut visited: KeySet<ObjectId> = KeySet::new();
    visited.insert(new_tip);
    let mut current = new_tip;

    loop {
        if current.to_hex() == old_sha1 {
            let recomputed = sha256.commit_sum(current)?.to_hex();
            let recorded = old_sha256.as_deref().unwrap_or_default();
            if recomputed != recorded {
                return Err(VerifyError::LocalStateMalformed {
                    detail: format!("SHA-256 does not match SHA-1 for {ref_name}"),
                });
            }
            return Ok(());
        }

        let commit = state
            .commits
            .get(&current)
            .ok_or(VerifyError::CommitMissing { id: current })?;

        match commit.parents.first() {
            Some(parent) if visited.insert(*parent) => current = *parent,
            _ => {
                return Err(VerifyError::BranchDeleted {
                    ref_name: ref_name.to_owned(),
                    was: old_sha1.to_owned(),
                })
            }
        }
    }
}

fn compute_tags(
    state: &RepoState,
    references: &[Ref],
    sha256: &mut GitHasher<'_, Sha256>,
) -> Result<Vec<RecordedRef>, VerifyError> {
    let mut out = Vec::new();
    for reference in references {
        if !reference.name.starts_with(TAGS_PREFIX) {
            continue;
        }

        let sha256_hex = if state.tags.contains_key(&reference.target) {
            sha256.tag_sum(reference.target)?.to_hex()
        } else {
            sha256.commit_sum(reference.target)?.to_hex()
        };

        out.push(RecordedRef {
            ref_name: reference.name.clone(),
            hash: Digests {
                sha1: Some(reference.target.to_hex()),
                sha256: Some(sha256_hex),
            },
        });
    }
    Ok(out)
}

fn compute_branches(
    references: &[Ref],
    config: &RepoConfig,
    sha256: &mut GitHasher<'_, Sha256>,
) -> Result<Vec<RecordedRef>, VerifyError> {
    let mut out = Vec::new();
    for reference in references {
        let Some(branch) = branch_name(&reference.name) else {
            continue;
        };
        if !config.protected_branches.contains(&branch) {
            continue;
        }

        out.push(RecordedRef {
            ref_name: reference.name.clone(),
            hash: Digests {
                sha1: Some(reference.target.to_hex()),
                sha256: Some(sha256.commit_sum(reference.target)?.to_hex()),
            },
        });
    }
    Ok(out)
}

fn index_by_ref(
    records: Vec<RecordedRef>,
) -> Result<AHashMap<String, RecordedRef>, VerifyError> {
    let mut map = AHashMap::new();
    for record in records {
        let name = record.ref_name.clone();
        if map.insert(name.clone(), record).is_some() {
            return Err(VerifyError::LocalStateMalformed {
                detail: format!("duplicate ref '{name}'"),
            });
        }
    }
    Ok(map)
}

fn both_set<'h>(
    old: &'h Option<String>,
    new: &'h Option<String>,
    what: &str,
) -> Result<(&'h str, &'h str), VerifyError> {
    match (old, new) {
        (Some(old), Some(new)) => Ok((old, new)),
        _ => Err(VerifyError::LocalStateMalformed {
            detail: format!("{what} hashes must be set"),
        }),
    }
}

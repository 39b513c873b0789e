//! Reference names and targets.

use super::object_id::ObjectId;

/// Prefix of local branch refs.
pub const HEADS_PREFIX: &str = "refs/heads/";
/// Prefix of remote-tracking refs.
pub const REMOTES_PREFIX: &str = "refs/remotes/";
/// Prefix of tag refs.
pub const TAGS_PREFIX: &str = "refs/tags/";
/// The symbolic remote HEAD ref, skipped by branch walks.
pub const ORIGIN_HEAD: &str = "refs/remotes/origin/HEAD";

/// A symbolic name paired with the id it points at.
///
/// For tag refs the target is either an annotated-tag object (annotated
/// tag) or a commit (lightweight tag); which one is determined by looking
/// the id up in the repository state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ref {
    pub name: String,
    pub target: ObjectId,
}

impl Ref {
    #[must_use]
    pub fn new(name: impl Into<String>, target: ObjectId) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// Extracts the branch name from a `refs/heads/*` or `refs/remotes/<r>/*`
/// ref name. For remote refs the remote segment is dropped, so
/// `refs/remotes/origin/release/v2` yields `release/v2`.
#[must_use]
pub fn branch_name(ref_name: &str) -> Option<String> {
    if let Some(rest) = ref_name.strip_prefix(HEADS_PREFIX) {
        return Some(rest.to_owned());
    }

    if let Some(rest) = ref_name.strip_prefix(REMOTES_PREFIX) {
        let (_remote, branch) = rest.split_once('/')?;
        return Some(branch.to_owned());
    }

    None
}

/// Short name of a `refs/tags/*` ref.
#[must_use]
pub fn tag_short_name(ref_name: &str) -> Option<&str> {
    ref_name.strip_prefix(TAGS_PREFIX)
}

/// True for `refs/remotes/origin/*` other than the symbolic HEAD.
#[must_use]
pub fn is_origin_branch(ref_name: &str) -> bool {
    ref_name.starts_with("refs/remotes/origin/") && ref_name != ORIGIN_HEAD
}

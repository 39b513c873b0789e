//! Repository policy enforcement.
//!
//! The verifier runs over loaded repository state in passes:
//!
//! 1. **Metadata pass** — every commit: parent-count bound, SHA-1
//!    self-check via the re-hasher, optional SHA-256 recompute, matching
//!    against the configured after frontier, and an ancestor BFS that marks
//!    everything at-or-below a matched commit as ignored.
//! 2. **Per-commit validation** — every non-ignored commit: committer
//!    identity lookup and signature verification (SSH or OpenPGP), with a
//!    dedicated path for forge-committed commits.
//! 3. **Tag validation** — exemption handling, annotated-tag name check,
//!    maintainer-only tagging, lightweight-tag rules.
//! 4. **Protected-branch validation** — first-parent walk from each
//!    protected tip down to its after anchor, enforcing merge-commit,
//!    maintainer, merge-tree, and up-to-date rules.
//!
//! Targeted validation (`VerifyOptions` with a commit) replaces passes 2-4
//! with an ancestor walk from one commit plus optional HEAD/tag/branch
//! cross-checks.
//!
//! All errors are fatal and bubble out; nothing is retried or skipped.

use ahash::AHashMap;
use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

use crate::git::encode::{commit_signing_payload, tag_signing_payload};
use crate::git::refs::{branch_name, tag_short_name, Ref, TAGS_PREFIX};
use crate::git::{Commit, ObjectId, RepoSource, RepoState};
use crate::hashing::GitHasher;
use crate::stdx::KeySet;

use super::errors::VerifyError;
use super::git_cli::MergeOps;
use super::gpg;
use super::repo_config::{CompiledIdentity, Forge, RepoConfig};
use super::ssh::{self, SshSignature, NAMESPACE_GIT};

/// Signature kind inferred from the stored signature text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureType {
    Ssh,
    Gpg,
    None,
}

impl SignatureType {
    /// Classifies a signature by its prefix. `Err(())` is an unknown
    /// armor type; the caller attaches context.
    fn infer(signature: Option<&str>) -> Result<Self, ()> {
        match signature {
            None => Ok(Self::None),
            Some(text) if text.starts_with("-----BEGIN SSH SIGNATURE-----") => Ok(Self::Ssh),
            Some(text) if text.starts_with("-----BEGIN PGP SIGNATURE-----") => Ok(Self::Gpg),
            Some(text) if text.is_empty() => Ok(Self::None),
            Some(_) => Err(()),
        }
    }
}

/// Per-commit verification metadata, created lazily during the metadata
/// pass and living for the run.
#[derive(Clone, Copy, Debug)]
pub struct CommitMetadata {
    pub signature_type: SignatureType,
    /// At or below the after frontier; signature rules do not apply.
    pub ignore: bool,
    /// Merge-tree check already passed for this commit.
    pub verified_no_content_changes: bool,
}

/// Targeted-validation request.
#[derive(Clone, Debug, Default)]
pub struct VerifyOptions {
    /// Target commit as 40-character hex. Enables targeted mode.
    pub commit: Option<String>,
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub verify_on_head: bool,
    pub verify_on_tip: bool,
}

/// Policy verifier over one repository.
pub struct Verifier<'a, M: MergeOps> {
    state: &'a RepoState,
    references: Vec<Ref>,
    head: Option<ObjectId>,
    config: RepoConfig,
    merge: &'a M,
    sha1: GitHasher<'a, Sha1>,
    sha256: GitHasher<'a, Sha256>,
    metadata: AHashMap<ObjectId, CommitMetadata>,
}

impl<'a, M: MergeOps> Verifier<'a, M> {
    /// Creates a verifier from pre-fetched references and HEAD.
    #[must_use]
    pub fn new(
        state: &'a RepoState,
        references: Vec<Ref>,
        head: Option<ObjectId>,
        config: RepoConfig,
        merge: &'a M,
    ) -> Self {
        Self {
            state,
            references,
            head,
            config,
            merge,
            sha1: GitHasher::new(state),
            sha256: GitHasher::new(state),
            metadata: AHashMap::new(),
        }
    }

    /// Creates a verifier, pulling references and HEAD from a source.
    pub fn from_source(
        state: &'a RepoState,
        source: &dyn RepoSource,
        config: RepoConfig,
        merge: &'a M,
    ) -> Result<Self, VerifyError> {
        let references = source.references().map_err(crate::git::StateError::Source)?;
        let head = source.head().ok();
        Ok(Self::new(state, references, head, config, merge))
    }

    /// Runs verification. With `opts.commit` set, runs targeted
    /// validation; otherwise validates every commit, tag, and protected
    /// branch.
    pub fn verify(&mut self, opts: Option<&VerifyOptions>) -> Result<(), VerifyError> {
        self.compute_commit_metadata()?;

        if let Some(opts) = opts {
            if let Some(commit) = &opts.commit {
                if !super::config::is_hex_sha1(commit) {
                    return Err(VerifyError::TargetMismatch {
                        detail: format!(
                            "target commit must be a 40 character hex, not '{commit}'"
                        ),
                    });
                }
                return self.validate_targeted(opts);
            }
        }

        let ids: Vec<ObjectId> = self.state.commits.keys().copied().collect();
        for id in ids {
            self.validate_commit(id)?;
        }

        self.validate_tags()?;
        self.validate_protected_branches()
    }

    /// Read access to the per-commit metadata (after a run).
    #[must_use]
    pub fn metadata(&self) -> &AHashMap<ObjectId, CommitMetadata> {
        &self.metadata
    }

    /// The compiled config, including after-frontier bridges discovered
    /// during the metadata pass.
    #[must_use]
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    // ---- metadata pass ----

    fn compute_commit_metadata(&mut self) -> Result<(), VerifyError> {
        let state = self.state;
        let need_sha256 = !self.config.after_sha256.is_empty();

        let mut found_sha1: KeySet<ObjectId> = KeySet::new();
        let mut found_sha256: KeySet<ObjectId> = KeySet::new();

        let ids: Vec<ObjectId> = state.commits.keys().copied().collect();
        for id in ids {
            let commit = &state.commits[&id];

            if commit.parents.len() > 2 {
                return Err(VerifyError::TooManyParents {
                    id,
                    count: commit.parents.len(),
                });
            }

            let recomputed = self.sha1.commit_sum(id)?;
            if recomputed != id {
                return Err(VerifyError::IntegrityFailure { id });
            }

            let sha256_id = if need_sha256 {
                Some(self.sha256.commit_sum(id)?)
            } else {
                None
            };

            let matched_sha256 = sha256_id
                .map(|h| self.config.after_sha256.contains(&h))
                .unwrap_or(false);
            if matched_sha256 {
                found_sha256.insert(sha256_id.expect("matched implies computed"));
            }

            let matched_sha1 = self.config.after_sha1.contains(&id);
            if matched_sha1 {
                found_sha1.insert(id);
            }

            let matched = if self.config.after_sha1_to_sha256.contains_key(&id) {
                // Both digests pinned; they must agree.
                if matched_sha1 != matched_sha256 {
                    return Err(VerifyError::AfterMismatch { id });
                }
                matched_sha1
            } else {
                matched_sha1 || matched_sha256
            };

            if matched && !matched_sha1 {
                // Matched via SHA-256 only: bridge the identity (and any
                // branch label) to the SHA-1 side.
                self.config.after_sha1.insert(id);
                found_sha1.insert(id);
                if let Some(h) = sha256_id {
                    if let Some(branch) = self.config.sha256_to_branch.get(&h).cloned() {
                        self.config.sha1_to_branch.insert(id, branch.clone());
                        self.config.branch_to_sha1.insert(branch, id);
                    }
                }
            }

            if self.metadata.contains_key(&id) {
                continue;
            }

            if matched {
                debug!(commit = %id, "after frontier matched");
                self.ignore_commit_and_ancestors(id)?;
            } else {
                let signature_type = self.signature_type_of(id, &state.commits[&id])?;
                self.metadata.insert(
                    id,
                    CommitMetadata {
                        signature_type,
                        ignore: false,
                        verified_no_content_changes: false,
                    },
                );
            }
        }

        let missing_sha1 = self.config.after_sha1.difference(&found_sha1);
        if !missing_sha1.is_empty() {
            let mut missing: Vec<String> =
                missing_sha1.iter().map(ToString::to_string).collect();
            missing.sort();
            return Err(VerifyError::AfterNotFound {
                kind: crate::git::DigestKind::Sha1,
                missing,
            });
        }

        let missing_sha256 = self.config.after_sha256.difference(&found_sha256);
        if !missing_sha256.is_empty() {
            let mut missing: Vec<String> =
                missing_sha256.iter().map(ToString::to_string).collect();
            missing.sort();
            return Err(VerifyError::AfterNotFound {
                kind: crate::git::DigestKind::Sha256,
                missing,
            });
        }

        Ok(())
    }

    /// Marks a commit and its whole ancestry as ignored, stopping at
    /// already-ignored commits.
    fn ignore_commit_and_ancestors(&mut self, start: ObjectId) -> Result<(), VerifyError> {
        let state = self.state;
        let mut queue = vec![start];

        while let Some(id) = queue.pop() {
            if self.metadata.get(&id).is_some_and(|m| m.ignore) {
                continue;
            }

            let commit = state
                .commits
                .get(&id)
                .ok_or(VerifyError::CommitMissing { id })?;

            for parent in &commit.parents {
                queue.push(*parent);
            }

            let signature_type = self.signature_type_of(id, commit)?;
            self.metadata.insert(
                id,
                CommitMetadata {
                    signature_type,
                    ignore: true,
                    verified_no_content_changes: false,
                },
            );
        }

        Ok(())
    }

    fn signature_type_of(
        &self,
        id: ObjectId,
        commit: &Commit,
    ) -> Result<SignatureType, VerifyError> {
        SignatureType::infer(commit.signature.as_deref()).map_err(|()| {
            VerifyError::UnknownSignatureType {
                context: format!("commit {id}"),
            }
        })
    }

    // ---- per-commit validation ----

    fn validate_commit(&mut self, id: ObjectId) -> Result<(), VerifyError> {
        let state = self.state;
        let commit = state
            .commits
            .get(&id)
            .ok_or(VerifyError::CommitMissing { id })?;
        let metadata = *self
            .metadata
            .get(&id)
            .ok_or(VerifyError::CommitMissing { id })?;

        if metadata.ignore {
            return Ok(());
        }

        if let Some(forge) = self.config.forge.clone() {
            if forge.email == commit.committer.email {
                return self.validate_forge_commit(id, commit, &forge);
            }
        }

        let email = &commit.committer.email;
        let identity = self
            .config
            .maintainer_or_contributor
            .get(email)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownIdentity {
                email: email.clone(),
                context: format!("commit {id}"),
            })?;

        match metadata.signature_type {
            SignatureType::Ssh => {
                let content = commit_signing_payload(commit);
                let signature = commit.signature.as_deref().expect("SSH type implies signature");
                self.validate_ssh(&content, signature, &identity, &format!("commit {id}"))
            }
            SignatureType::Gpg => {
                let content = commit_signing_payload(commit);
                let signature = commit.signature.as_deref().expect("GPG type implies signature");
                self.validate_gpg(
                    &content,
                    signature,
                    &identity,
                    &commit.committer.email,
                    &format!("commit {id}"),
                )
            }
            SignatureType::None => Err(VerifyError::UnsignedCommit { id }),
        }
    }

    fn validate_forge_commit(
        &mut self,
        id: ObjectId,
        commit: &Commit,
        forge: &Forge,
    ) -> Result<(), VerifyError> {
        let content = commit_signing_payload(commit);
        let signature =
            commit
                .signature
                .as_deref()
                .ok_or(VerifyError::UnsignedCommit { id })?;

        gpg::verify_detached(
            &forge.gpg_public_key,
            signature,
            &content,
            &commit.committer.email,
        )
        .map_err(|err| VerifyError::SignatureInvalid {
            context: format!("forge commit {id}"),
            detail: err.to_string(),
        })?;

        if !forge.allow_merge_commits && !forge.allow_content_commits {
            return Err(VerifyError::ForgePolicyViolation {
                id,
                detail: "forge is not allowed to make commits".into(),
            });
        }

        let author = &commit.author.email;
        if !self.config.maintainer_or_contributor.contains_key(author)
            && !self
                .config
                .maintainer_or_contributor_forge_emails
                .contains_key(author)
        {
            return Err(VerifyError::UnknownIdentity {
                email: author.clone(),
                context: format!("forge commit {id} author"),
            });
        }

        if !forge.allow_merge_commits && commit.parents.len() > 1 {
            return Err(VerifyError::ForgePolicyViolation {
                id,
                detail: "up to one parent supported for forge".into(),
            });
        }

        if forge.allow_merge_commits && !forge.allow_content_commits {
            self.check_merge_has_no_content(id, commit)?;
            if let Some(metadata) = self.metadata.get_mut(&id) {
                metadata.verified_no_content_changes = true;
            }
        }

        Ok(())
    }

    fn validate_ssh(
        &self,
        content: &[u8],
        signature: &str,
        identity: &CompiledIdentity,
        context: &str,
    ) -> Result<(), VerifyError> {
        let invalid = |detail: String| VerifyError::SignatureInvalid {
            context: context.to_owned(),
            detail,
        };

        if !self.config.rules.allow_ssh_signatures {
            return Err(invalid("SSH signatures not allowed".into()));
        }

        let parsed = SshSignature::parse_pem(signature).map_err(|err| invalid(err.to_string()))?;

        let key = identity
            .ssh_public_keys
            .get(&parsed.public_key_blob)
            .ok_or_else(|| {
                invalid(format!("matching SSH key not found for '{}'", identity.email))
            })?;

        ssh::verify_signature(key, content, &parsed, NAMESPACE_GIT)
            .map_err(|err| invalid(err.to_string()))?;

        let rules = &self.config.rules;
        if rules.require_ssh_user_present || rules.require_ssh_user_verified {
            if !key.is_security_key() {
                return Err(invalid(format!(
                    "unsupported public key type {} for user present/verified",
                    key.algorithm()
                )));
            }

            let flags = parsed
                .security_key_flags()
                .map_err(|err| invalid(err.to_string()))?;

            if rules.require_ssh_user_present && !flags.user_present() {
                return Err(invalid("user present missing".into()));
            }
            if rules.require_ssh_user_verified && !flags.user_verified() {
                return Err(invalid("user verified missing".into()));
            }
        }

        Ok(())
    }

    fn validate_gpg(
        &self,
        content: &[u8],
        signature: &str,
        identity: &CompiledIdentity,
        signer_email: &str,
        context: &str,
    ) -> Result<(), VerifyError> {
        let invalid = |detail: String| VerifyError::SignatureInvalid {
            context: context.to_owned(),
            detail,
        };

        if !self.config.rules.allow_gpg_signatures {
            return Err(invalid("GPG signatures not allowed".into()));
        }

        if identity.gpg_public_keys.is_empty() {
            return Err(invalid(format!(
                "GPG public key not found for '{}'",
                identity.email
            )));
        }
        if identity.gpg_public_keys.len() > 1 {
            return Err(invalid(format!(
                "only one GPG key is currently supported, got {}",
                identity.gpg_public_keys.len()
            )));
        }

        gpg::verify_detached(&identity.gpg_public_keys[0], signature, content, signer_email)
            .map_err(|err| invalid(err.to_string()))
    }

    // ---- merge-tree check ----

    /// A non-content merge commit has two parents and the same tree as
    /// `merge-tree(parent1, parent2)`.
    fn check_merge_has_no_content(
        &mut self,
        id: ObjectId,
        commit: &Commit,
    ) -> Result<(), VerifyError> {
        if commit.parents.len() != 2 {
            return Err(VerifyError::MergeContentDrift {
                id,
                detail: format!("expected 2 parents, got {}", commit.parents.len()),
            });
        }

        let merged_tree = self
            .merge
            .merge_tree(&commit.parents[0], &commit.parents[1])?;

        if merged_tree != commit.tree {
            return Err(VerifyError::MergeContentDrift {
                id,
                detail: format!("expected tree '{}', got '{merged_tree}'", commit.tree),
            });
        }

        Ok(())
    }

    // ---- tag validation ----

    fn validate_tags(&mut self) -> Result<(), VerifyError> {
        let tag_refs: Vec<Ref> = self
            .references
            .iter()
            .filter(|r| r.name.starts_with(TAGS_PREFIX))
            .cloned()
            .collect();

        for tag_ref in tag_refs {
            self.validate_tag(&tag_ref)?;
        }
        Ok(())
    }

    fn validate_tag(&mut self, tag_ref: &Ref) -> Result<(), VerifyError> {
        let state = self.state;
        let mut exempt = false;

        if let Some(expected) = self.config.exempt_tags_sha1.get(&tag_ref.name) {
            let got = tag_ref.target.to_hex();
            if *expected != got {
                return Err(VerifyError::ExemptTagMismatch {
                    ref_name: tag_ref.name.clone(),
                    kind: crate::git::DigestKind::Sha1,
                    got,
                    expected: expected.clone(),
                });
            }
            exempt = true;
        }

        let annotated = state.tags.get(&tag_ref.target);

        if let Some(expected) = self.config.exempt_tags_sha256.get(&tag_ref.name).cloned() {
            let recomputed = if annotated.is_some() {
                self.sha256.tag_sum(tag_ref.target)?
            } else {
                self.sha256.commit_sum(tag_ref.target)?
            };
            let got = recomputed.to_hex();
            if expected != got {
                return Err(VerifyError::ExemptTagMismatch {
                    ref_name: tag_ref.name.clone(),
                    kind: crate::git::DigestKind::Sha256,
                    got,
                    expected,
                });
            }
            exempt = true;
        }

        let short_name = tag_short_name(&tag_ref.name).unwrap_or(&tag_ref.name);

        let Some(tag) = annotated else {
            // Lightweight tag: nothing to sign.
            if !exempt && self.config.rules.require_signed_tags {
                return Err(VerifyError::UnsignedTag {
                    name: tag_ref.name.clone(),
                    lightweight: true,
                });
            }
            return Ok(());
        };

        if short_name != tag.name {
            return Err(VerifyError::TagNameMismatch {
                ref_name: short_name.to_owned(),
                tag_name: tag.name.clone(),
            });
        }

        if exempt {
            return Ok(());
        }

        let signature_type =
            SignatureType::infer(tag.signature.as_deref()).map_err(|()| {
                VerifyError::UnknownSignatureType {
                    context: format!("tag {}", tag.name),
                }
            })?;

        // Contributors may not sign tags.
        let identity = self
            .config
            .maintainers
            .get(&tag.tagger.email)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownIdentity {
                email: tag.tagger.email.clone(),
                context: format!("tag {}", tag.name),
            })?;

        match signature_type {
            SignatureType::Ssh => {
                let content = tag_signing_payload(tag);
                let signature = tag.signature.as_deref().expect("SSH type implies signature");
                self.validate_ssh(&content, signature, &identity, &format!("tag {}", tag.name))
            }
            SignatureType::Gpg => {
                let content = tag_signing_payload(tag);
                let signature = tag.signature.as_deref().expect("GPG type implies signature");
                self.validate_gpg(
                    &content,
                    signature,
                    &identity,
                    &tag.tagger.email,
                    &format!("tag {}", tag.name),
                )
            }
            SignatureType::None => {
                if self.config.rules.require_signed_tags {
                    Err(VerifyError::UnsignedTag {
                        name: tag.name.clone(),
                        lightweight: false,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    // ---- protected branches ----

    fn validate_protected_branches(&mut self) -> Result<(), VerifyError> {
        let candidates: Vec<(String, Ref)> = self
            .references
            .iter()
            .filter_map(|r| {
                let branch = branch_name(&r.name)?;
                self.config
                    .protected_branches
                    .contains(&branch)
                    .then(|| (branch, r.clone()))
            })
            .collect();

        for (branch, branch_ref) in candidates {
            self.validate_protected_branch(&branch, &branch_ref)?;
        }
        Ok(())
    }

    fn validate_protected_branch(
        &mut self,
        branch: &str,
        branch_ref: &Ref,
    ) -> Result<(), VerifyError> {
        let state = self.state;

        let target_after = *self.config.branch_to_sha1.get(branch).ok_or_else(|| {
            VerifyError::ProtectedBranchMalformed {
                branch: branch.to_owned(),
                detail: "protected branch without matching after branch".into(),
            }
        })?;

        let mut current_id = branch_ref.target;

        loop {
            if current_id == target_after {
                return Ok(());
            }

            let commit = state
                .commits
                .get(&current_id)
                .ok_or(VerifyError::CommitMissing { id: current_id })?;

            if self.config.rules.require_merge_commits && commit.parents.len() != 2 {
                return Err(VerifyError::ProtectedBranchMalformed {
                    branch: branch.to_owned(),
                    detail: format!(
                        "requireMergeCommits is set, but commit {current_id} has {} parents",
                        commit.parents.len()
                    ),
                });
            }

            if commit.parents.len() == 2 {
                self.check_protected_merge(branch, current_id, commit)?;
            }

            if commit.parents.is_empty() {
                return Err(VerifyError::ProtectedBranchMalformed {
                    branch: branch.to_owned(),
                    detail: format!("'{}' is not a descendant of after", branch_ref.name),
                });
            }

            current_id = commit.parents[0];
        }
    }

    fn check_protected_merge(
        &mut self,
        branch: &str,
        id: ObjectId,
        commit: &Commit,
    ) -> Result<(), VerifyError> {
        // The merger (or, for forge-committed merges, the author) must be
        // a maintainer.
        let committer = &commit.committer.email;
        let mut is_maintainer = self.config.maintainers.contains_key(committer);
        if !is_maintainer {
            if let Some(forge) = &self.config.forge {
                if *committer == forge.email {
                    let author = &commit.author.email;
                    is_maintainer = self.config.maintainers.contains_key(author)
                        || self.config.maintainer_forge_emails.contains_key(author);
                }
            }
        }
        if !is_maintainer {
            return Err(VerifyError::ProtectedBranchMalformed {
                branch: branch.to_owned(),
                detail: format!("merge commit {id} made by {committer} which is not a maintainer"),
            });
        }

        let already_verified = self
            .metadata
            .get(&id)
            .is_some_and(|m| m.verified_no_content_changes);
        if !already_verified {
            self.check_merge_has_no_content(id, commit)?;
            if let Some(metadata) = self.metadata.get_mut(&id) {
                metadata.verified_no_content_changes = true;
            }
        }

        if self.config.rules.require_up_to_date {
            let base = self.merge.merge_base(&commit.parents[0], &commit.parents[1])?;
            if base != commit.parents[0] {
                return Err(VerifyError::ProtectedBranchMalformed {
                    branch: branch.to_owned(),
                    detail: format!("second parent of {id} is not up to date with first"),
                });
            }
        }

        Ok(())
    }

    // ---- targeted validation ----

    fn validate_targeted(&mut self, opts: &VerifyOptions) -> Result<(), VerifyError> {
        let state = self.state;
        let commit_hex = opts.commit.as_deref().expect("targeted mode requires commit");
        let target = ObjectId::from_hex(commit_hex).expect("hex shape checked by caller");

        if !state.commits.contains_key(&target) {
            return Err(VerifyError::TargetNotFound {
                what: "commit",
                name: commit_hex.to_owned(),
            });
        }

        self.validate_commit(target)?;

        if opts.verify_on_head {
            let head = self.resolved_head()?;
            if target != head {
                return Err(VerifyError::TargetMismatch {
                    detail: format!("HEAD does not point to the target commit {commit_hex}"),
                });
            }
        }

        // Validate all non-ignored ancestors.
        let mut visited: KeySet<ObjectId> = KeySet::new();
        visited.insert(target);
        let mut queue = vec![target];
        while let Some(current) = queue.pop() {
            let commit = &state.commits[&current];
            for parent in &commit.parents {
                if visited.contains(parent) {
                    continue;
                }
                if !state.commits.contains_key(parent) {
                    return Err(VerifyError::CommitMissing { id: *parent });
                }
                if !self.metadata[parent].ignore {
                    self.validate_commit(*parent)?;
                    queue.push(*parent);
                    visited.insert(*parent);
                }
            }
        }

        self.check_connected_to_after(target, opts.branch.as_deref())?;

        let mut tag_target: Option<ObjectId> = None;
        if let Some(tag_name) = opts.tag.as_deref() {
            tag_target = Some(self.validate_target_tag(tag_name, opts.verify_on_head)?);
        }

        if let Some(tag_target) = tag_target {
            if tag_target != target {
                return Err(VerifyError::TargetMismatch {
                    detail: format!(
                        "target tag '{}' does not point to target commit '{commit_hex}'",
                        opts.tag.as_deref().unwrap_or_default()
                    ),
                });
            }
        }

        if let Some(branch) = opts.branch.as_deref() {
            self.validate_target_branch(branch, target, opts.verify_on_tip)?;
        }

        Ok(())
    }

    fn resolved_head(&self) -> Result<ObjectId, VerifyError> {
        self.head.ok_or(VerifyError::TargetMismatch {
            detail: "unable to resolve HEAD".into(),
        })
    }

    /// The target must be anchored to the after frontier by first-parent
    /// ancestry (or be an after commit itself). When the options name a
    /// branch with its own after entry, only that entry anchors.
    fn check_connected_to_after(
        &self,
        target: ObjectId,
        branch: Option<&str>,
    ) -> Result<(), VerifyError> {
        let state = self.state;
        let required = branch.and_then(|b| self.config.branch_to_sha1.get(b)).copied();

        let mut current = target;
        loop {
            let anchored = match required {
                Some(required) => current == required,
                None => self.metadata.get(&current).is_some_and(|m| m.ignore),
            };
            if anchored {
                return Ok(());
            }

            let commit = state
                .commits
                .get(&current)
                .ok_or(VerifyError::CommitMissing { id: current })?;
            match commit.parents.first() {
                Some(parent) => current = *parent,
                None => return Err(VerifyError::NotConnectedToAfter { id: target }),
            }
        }
    }

    /// Validates the named tag and resolves it to the commit it points at.
    fn validate_target_tag(
        &mut self,
        tag_name: &str,
        verify_on_head: bool,
    ) -> Result<ObjectId, VerifyError> {
        let state = self.state;
        let tag_ref = self
            .references
            .iter()
            .find(|r| tag_short_name(&r.name) == Some(tag_name))
            .cloned()
            .ok_or(VerifyError::TargetNotFound {
                what: "tag",
                name: tag_name.to_owned(),
            })?;

        self.validate_tag(&tag_ref)?;

        let resolved = match state.tags.get(&tag_ref.target) {
            Some(annotated) => annotated.target,
            None => tag_ref.target,
        };

        if verify_on_head {
            let head = self.resolved_head()?;
            if resolved != head {
                return Err(VerifyError::TargetMismatch {
                    detail: format!(
                        "HEAD does not point to the same commit {resolved} as target tag '{tag_name}'"
                    ),
                });
            }
        }

        Ok(resolved)
    }

    /// Requires the target to be the branch tip (`verify_on_tip`) or to
    /// lie on the tip's first-parent history, validating commits walked.
    fn validate_target_branch(
        &mut self,
        branch: &str,
        target: ObjectId,
        verify_on_tip: bool,
    ) -> Result<(), VerifyError> {
        let state = self.state;
        let prefix = "refs/remotes/origin/";
        let branch_ref = self
            .references
            .iter()
            .find(|r| r.name.strip_prefix(prefix) == Some(branch))
            .cloned()
            .ok_or(VerifyError::TargetNotFound {
                what: "branch",
                name: branch.to_owned(),
            })?;

        if !state.commits.contains_key(&branch_ref.target) {
            return Err(VerifyError::CommitMissing {
                id: branch_ref.target,
            });
        }
        self.validate_commit(branch_ref.target)?;

        if verify_on_tip {
            if target != branch_ref.target {
                return Err(VerifyError::TargetMismatch {
                    detail: format!(
                        "target commit {target} does not point to the tip of branch '{branch}'"
                    ),
                });
            }
            return Ok(());
        }

        let mut current = branch_ref.target;
        loop {
            if current == target {
                return Ok(());
            }

            let commit = state
                .commits
                .get(&current)
                .ok_or(VerifyError::CommitMissing { id: current })?;
            match commit.parents.first() {
                Some(parent) => {
                    if !state.commits.contains_key(parent) {
                        return Err(VerifyError::CommitMissing { id: *parent });
                    }
                    self.validate_commit(*parent)?;
                    current = *parent;
                }
                None => {
                    return Err(VerifyError::TargetMismatch {
                        detail: format!(
                            "target commit {target} is not on target branch '{branch}'"
                        ),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{AnnotatedTag, MemorySource, ObjectKind, Person, Tree};
    use crate::verify::config::ParsedConfig;
    use crate::verify::git_cli::GitCliError;
    use crate::verify::ssh::test_support::TestSigner;

    const REPO_URI: &str = "git+https://github.com/acme/widget.git";

    /// Merge operations answered from a fixed table.
    #[derive(Default)]
    struct FakeMerge {
        bases: Vec<(ObjectId, ObjectId, ObjectId)>,
        trees: Vec<(ObjectId, ObjectId, ObjectId)>,
    }

    impl MergeOps for FakeMerge {
        fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
            self.bases
                .iter()
                .find(|(x, y, _)| x == a && y == b)
                .map(|(_, _, r)| *r)
                .ok_or(GitCliError::BadOutput {
                    operation: "merge-base",
                    output: "unset".into(),
                })
        }

        fn merge_tree(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, GitCliError> {
            self.trees
                .iter()
                .find(|(x, y, _)| x == a && y == b)
                .map(|(_, _, r)| *r)
                .ok_or(GitCliError::BadOutput {
                    operation: "merge-tree",
                    output: "unset".into(),
                })
        }
    }

    fn person(email: &str) -> Person {
        Person {
            name: "Test".into(),
            email: email.into(),
            timestamp: 1_700_000_000,
            tz: "+0000".into(),
        }
    }

    /// Builds a config whose single maintainer signs with `signer`.
    fn config_for(signer: &TestSigner, extra_repo: &str) -> RepoConfig {
        let text = format!(
            r#"{{
  "_type": "https://supply-chain-tools.github.io/schemas/gitverify/v0.1",
  "identities": [{{"email": "m@example.com", "sshPublicKeys": ["{}"]}}],
  "maintainers": ["m@example.com"],
  "rules": {{
    "allowSshSignatures": true,
    "requireSshUserPresent": false,
    "requireSshUserVerified": false
  }},
  "repositories": [{{"uri": "{REPO_URI}"{extra_repo}}}]
}}"#,
            signer.authorized_key
        );
        let parsed = ParsedConfig::from_json(&text).unwrap();
        RepoConfig::compile(&parsed, REPO_URI).unwrap()
    }

    /// A signed commit fixture: sign-then-store so the stored id covers
    /// the signature block.
    fn add_signed_commit(
        source: &mut MemorySource,
        signer: &TestSigner,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: &str,
    ) -> ObjectId {
        let mut commit = Commit {
            tree,
            parents,
            author: person("m@example.com"),
            committer: person("m@example.com"),
            signature: None,
            message: message.into(),
        };
        let payload = crate::git::encode::commit_signing_payload(&commit);
        commit.signature = Some(signer.sign(&payload, NAMESPACE_GIT));
        source.add_commit(&commit)
    }

    fn add_unsigned_commit(
        source: &mut MemorySource,
        email: &str,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: &str,
    ) -> ObjectId {
        source.add_commit(&Commit {
            tree,
            parents,
            author: person(email),
            committer: person(email),
            signature: None,
            message: message.into(),
        })
    }

    #[test]
    fn signed_history_verifies() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let root = add_signed_commit(&mut source, &signer, tree, vec![], "root\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![root], "tip\n");
        source.add_ref("refs/remotes/origin/main", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier = Verifier::from_source(
            &state,
            &source,
            config_for(&signer, ""),
            &merge,
        )
        .unwrap();
        verifier.verify(None).unwrap();
    }

    #[test]
    fn unsigned_commit_is_fatal() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let commit = add_unsigned_commit(&mut source, "m@example.com", tree, vec![], "r\n");
        source.set_head(commit);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::UnsignedCommit { id }) if id == commit
        ));
    }

    #[test]
    fn unknown_committer_is_fatal() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        add_unsigned_commit(&mut source, "stranger@example.com", tree, vec![], "r\n");

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::UnknownIdentity { email, .. }) if email == "stranger@example.com"
        ));
    }

    #[test]
    fn tampered_commit_fails_integrity() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let commit = Commit {
            tree,
            parents: vec![],
            author: person("m@example.com"),
            committer: person("m@example.com"),
            signature: None,
            message: "original\n".into(),
        };
        // Claimed id is correct for a different message.
        let claimed = source.add_commit(&commit);
        let mut tampered = commit;
        tampered.message = "tampered\n".into();
        let mut lying = MemorySource::new();
        lying.add_tree(&Tree::default());
        lying.add_raw(
            ObjectKind::Commit,
            claimed,
            crate::git::encode::encode_commit(&tampered).unwrap(),
        );

        let state = RepoState::load(&lying).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &lying, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::IntegrityFailure { id }) if id == claimed
        ));
    }

    #[test]
    fn three_parents_rejected_in_metadata_pass() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let a = add_unsigned_commit(&mut source, "m@example.com", tree, vec![], "a\n");
        let b = add_unsigned_commit(&mut source, "m@example.com", tree, vec![], "b\n");
        let c = add_unsigned_commit(&mut source, "m@example.com", tree, vec![], "c\n");
        add_unsigned_commit(&mut source, "m@example.com", tree, vec![a, b, c], "octopus\n");

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::TooManyParents { count: 3, .. })
        ));
    }

    #[test]
    fn after_frontier_skips_ancestor_signatures() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        // Unsigned history below the frontier.
        let old = add_unsigned_commit(&mut source, "ghost@example.com", tree, vec![], "old\n");
        let frontier = add_unsigned_commit(&mut source, "ghost@example.com", tree, vec![old], "f\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "tip\n");
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(", \"after\": [{{\"sha1\": \"{frontier}\"}}]");
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        verifier.verify(None).unwrap();

        assert!(verifier.metadata()[&frontier].ignore);
        assert!(verifier.metadata()[&old].ignore);
        assert!(!verifier.metadata()[&tip].ignore);
    }

    #[test]
    fn missing_after_commit_is_fatal() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(", \"after\": [{{\"sha1\": \"{}\"}}]", "9".repeat(40));
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::AfterNotFound { .. })
        ));
    }

    #[test]
    fn after_dual_digest_must_agree() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "tip\n");
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        // Correct SHA-1, wrong SHA-256.
        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"sha256\": \"{}\"}}]",
            "c".repeat(64)
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::AfterMismatch { .. })
        ));
    }

    #[test]
    fn after_sha256_only_bridges_to_sha1() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "tip\n");
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let mut sha256 = GitHasher::<Sha256>::new(&state);
        let frontier256 = sha256.commit_sum(frontier).unwrap();

        let merge = FakeMerge::default();
        let extra = format!(
            ", \"after\": [{{\"sha256\": \"{frontier256}\", \"branch\": \"main\"}}]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        verifier.verify(None).unwrap();

        assert!(verifier.config().after_sha1.contains(&frontier));
        assert_eq!(verifier.config().branch_to_sha1["main"], frontier);
        assert!(verifier.metadata()[&frontier].ignore);
    }

    #[test]
    fn lightweight_tag_fatal_when_signing_required() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");
        source.add_ref("refs/tags/v1.0.0", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::UnsignedTag { lightweight: true, .. })
        ));
    }

    #[test]
    fn exempt_tag_bypasses_signature_rules() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");
        source.add_ref("refs/tags/v1.0.0", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(
            ", \"exemptTags\": [{{\"ref\": \"refs/tags/v1.0.0\", \"hash\": {{\"sha1\": \"{tip}\"}}}}]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        verifier.verify(None).unwrap();
    }

    #[test]
    fn exempt_tag_with_wrong_hash_is_fatal() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");
        source.add_ref("refs/tags/v1.0.0", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(
            ", \"exemptTags\": [{{\"ref\": \"refs/tags/v1.0.0\", \"hash\": {{\"sha1\": \"{}\"}}}}]",
            "d".repeat(40)
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::ExemptTagMismatch { .. })
        ));
    }

    #[test]
    fn annotated_tag_by_maintainer_with_ssh_signature() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");

        let mut tag = AnnotatedTag {
            target: tip,
            target_kind: ObjectKind::Commit,
            name: "v1.0.0".into(),
            tagger: person("m@example.com"),
            signature: None,
            message: "release\n".into(),
        };
        let payload = crate::git::encode::tag_signing_payload(&tag);
        tag.signature = Some(signer.sign(&payload, NAMESPACE_GIT));
        let tag_id = source.add_tag(&tag);
        source.add_ref("refs/tags/v1.0.0", tag_id);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        verifier.verify(None).unwrap();
    }

    #[test]
    fn tag_name_mismatch_is_fatal() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let tip = add_signed_commit(&mut source, &signer, tree, vec![], "tip\n");

        let mut tag = AnnotatedTag {
            target: tip,
            target_kind: ObjectKind::Commit,
            name: "v2.0.0".into(),
            tagger: person("m@example.com"),
            signature: None,
            message: "release\n".into(),
        };
        let payload = crate::git::encode::tag_signing_payload(&tag);
        tag.signature = Some(signer.sign(&payload, NAMESPACE_GIT));
        let tag_id = source.add_tag(&tag);
        source.add_ref("refs/tags/v1.0.0", tag_id);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::TagNameMismatch { .. })
        ));
    }

    #[test]
    fn protected_branch_requires_merge_commits() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        // Direct (non-merge) commit on top of the frontier.
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "direct\n");
        source.add_ref("refs/remotes/origin/main", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::ProtectedBranchMalformed { branch, .. }) if branch == "main"
        ));
    }

    #[test]
    fn protected_branch_merge_flow_passes() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let feature = add_signed_commit(&mut source, &signer, tree, vec![frontier], "feat\n");
        let merge_commit =
            add_signed_commit(&mut source, &signer, tree, vec![frontier, feature], "merge\n");
        source.add_ref("refs/remotes/origin/main", merge_commit);
        source.set_head(merge_commit);

        let state = RepoState::load(&source).unwrap();
        let state_merge = &state.commits[&merge_commit];
        let merge = FakeMerge {
            bases: vec![(
                state_merge.parents[0],
                state_merge.parents[1],
                state_merge.parents[0],
            )],
            trees: vec![(state_merge.parents[0], state_merge.parents[1], tree)],
        };

        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        verifier.verify(None).unwrap();
    }

    #[test]
    fn protected_branch_merge_with_content_drift_fails() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let blob_id = source.add_blob(b"x\n");
        let other_tree = source.add_tree(&Tree {
            entries: vec![crate::git::TreeEntry {
                mode: crate::git::EntryMode::Regular,
                name: "x".into(),
                id: blob_id,
            }],
        });
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let feature = add_signed_commit(&mut source, &signer, tree, vec![frontier], "feat\n");
        let merge_commit =
            add_signed_commit(&mut source, &signer, tree, vec![frontier, feature], "merge\n");
        source.add_ref("refs/remotes/origin/main", merge_commit);
        source.set_head(merge_commit);

        let state = RepoState::load(&source).unwrap();
        let parents = state.commits[&merge_commit].parents.clone();
        let merge = FakeMerge {
            bases: vec![(parents[0], parents[1], parents[0])],
            // merge-tree reports a different tree than the commit's.
            trees: vec![(parents[0], parents[1], other_tree)],
        };

        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::MergeContentDrift { .. })
        ));
    }

    #[test]
    fn protected_branch_not_up_to_date_fails() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let feature = add_signed_commit(&mut source, &signer, tree, vec![frontier], "feat\n");
        let merge_commit =
            add_signed_commit(&mut source, &signer, tree, vec![frontier, feature], "merge\n");
        source.add_ref("refs/remotes/origin/main", merge_commit);
        source.set_head(merge_commit);

        let state = RepoState::load(&source).unwrap();
        let parents = state.commits[&merge_commit].parents.clone();
        let merge = FakeMerge {
            // merge-base is not the first parent: second parent not rebased.
            bases: vec![(parents[0], parents[1], frontier)],
            trees: vec![(parents[0], parents[1], tree)],
        };

        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"]"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let result = verifier.verify(None);
        assert!(matches!(
            result,
            Err(VerifyError::ProtectedBranchMalformed { .. })
        ));
    }

    #[test]
    fn disconnected_protected_branch_fails() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        // A root commit unrelated to the frontier.
        let stray = add_signed_commit(&mut source, &signer, tree, vec![], "stray\n");
        source.add_ref("refs/remotes/origin/main", stray);
        source.set_head(stray);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"], \"rules\": {{\"allowSshSignatures\": true, \"requireSshUserPresent\": false, \"requireSshUserVerified\": false, \"requireMergeCommits\": false}}"
        );
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::ProtectedBranchMalformed { detail, .. })
                if detail.contains("not a descendant of after")
        ));
    }

    #[test]
    fn targeted_validation_requires_after_anchor() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "tip\n");
        // A second root disconnected from the frontier.
        let stray = add_signed_commit(&mut source, &signer, tree, vec![], "stray\n");
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(", \"after\": [{{\"sha1\": \"{frontier}\"}}]");

        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(tip.to_string()),
            verify_on_head: true,
            ..Default::default()
        };
        verifier.verify(Some(&opts)).unwrap();

        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(stray.to_string()),
            ..Default::default()
        };
        assert!(matches!(
            verifier.verify(Some(&opts)),
            Err(VerifyError::NotConnectedToAfter { .. })
        ));
    }

    #[test]
    fn targeted_head_and_tip_checks() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let mid = add_signed_commit(&mut source, &signer, tree, vec![frontier], "mid\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![mid], "tip\n");
        source.add_ref("refs/remotes/origin/main", tip);
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(", \"after\": [{{\"sha1\": \"{frontier}\"}}]");

        // mid is on the branch but not the tip.
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(mid.to_string()),
            branch: Some("main".into()),
            ..Default::default()
        };
        verifier.verify(Some(&opts)).unwrap();

        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(mid.to_string()),
            branch: Some("main".into()),
            verify_on_tip: true,
            ..Default::default()
        };
        assert!(matches!(
            verifier.verify(Some(&opts)),
            Err(VerifyError::TargetMismatch { .. })
        ));

        // HEAD check.
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(mid.to_string()),
            verify_on_head: true,
            ..Default::default()
        };
        assert!(matches!(
            verifier.verify(Some(&opts)),
            Err(VerifyError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn targeted_tag_resolution() {
        let signer = TestSigner::new(7);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let frontier = add_unsigned_commit(&mut source, "g@example.com", tree, vec![], "f\n");
        let tip = add_signed_commit(&mut source, &signer, tree, vec![frontier], "tip\n");
        source.add_ref("refs/tags/v1.0.0", tip); // lightweight
        source.set_head(tip);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let extra = format!(
            ", \"after\": [{{\"sha1\": \"{frontier}\"}}], \"exemptTags\": [{{\"ref\": \"refs/tags/v1.0.0\", \"hash\": {{\"sha1\": \"{tip}\"}}}}]"
        );

        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(tip.to_string()),
            tag: Some("v1.0.0".into()),
            ..Default::default()
        };
        verifier.verify(Some(&opts)).unwrap();

        // The tag does not point at the frontier commit.
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, &extra), &merge).unwrap();
        let opts = VerifyOptions {
            commit: Some(frontier.to_string()),
            tag: Some("v1.0.0".into()),
            ..Default::default()
        };
        assert!(verifier.verify(Some(&opts)).is_err());
    }

    #[test]
    fn ssh_signature_from_wrong_key_fails() {
        let signer = TestSigner::new(7);
        let imposter = TestSigner::new(13);
        let mut source = MemorySource::new();
        let tree = source.add_tree(&Tree::default());
        let commit = add_signed_commit(&mut source, &imposter, tree, vec![], "evil\n");
        source.set_head(commit);

        let state = RepoState::load(&source).unwrap();
        let merge = FakeMerge::default();
        let mut verifier =
            Verifier::from_source(&state, &source, config_for(&signer, ""), &merge).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(VerifyError::SignatureInvalid { .. })
        ));
    }
}

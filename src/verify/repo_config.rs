//! Compiled per-repository policy.
//!
//! [`RepoConfig`] is the verifier-facing form of one repository's
//! configuration: identity lookup maps keyed by email (native and
//! forge-synthesized), parsed SSH keys keyed by wire blob, after-frontier
//! sets per digest algorithm with their branch bridges, exempt-tag maps,
//! and the resolved rule booleans.
//!
//! The after-frontier maps are deliberately mutable: the metadata pass
//! bridges SHA-256-matched commits back to their SHA-1 identities as it
//! discovers them.

use std::sync::Arc;

use ahash::AHashMap;

use crate::git::ObjectId;
use crate::stdx::KeySet;

use super::config::{ConfigError, ParsedConfig, ParsedRepository, ResolvedRules};
use super::ssh::SshPublicKey;

/// The recognized forge id.
pub const GITHUB_FORGE_ID: &str = "github.com";
/// Committer email GitHub uses for web-flow commits (merges made in the UI).
pub const GITHUB_WEB_FLOW_EMAIL: &str = "noreply@github.com";

/// Synthesizes the noreply email GitHub attributes to a user.
#[must_use]
pub fn github_user_email(user_id: &str, username: &str) -> String {
    format!("{user_id}+{username}@users.noreply.github.com")
}

/// One configured identity with parsed key material.
#[derive(Clone, Debug)]
pub struct CompiledIdentity {
    pub email: String,
    pub forge_username: Option<String>,
    pub forge_user_id: Option<String>,
    /// SSH keys keyed by their wire blob — the exact bytes an SSHSIG
    /// envelope carries, enabling exact-match lookup.
    pub ssh_public_keys: AHashMap<Vec<u8>, SshPublicKey>,
    pub gpg_public_keys: Vec<String>,
}

/// The forge treated as a committer identity of its own.
#[derive(Clone, Debug)]
pub struct Forge {
    pub email: String,
    pub gpg_public_key: String,
    pub allow_merge_commits: bool,
    pub allow_content_commits: bool,
}

/// Everything the verifier needs to know about one repository.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    pub after_sha1: KeySet<ObjectId>,
    pub after_sha256: KeySet<ObjectId>,
    pub sha1_to_branch: AHashMap<ObjectId, String>,
    pub branch_to_sha1: AHashMap<String, ObjectId>,
    pub sha256_to_branch: AHashMap<ObjectId, String>,
    /// After entries that pin both digests; matching exactly one is fatal.
    pub after_sha1_to_sha256: AHashMap<ObjectId, ObjectId>,

    pub maintainers: AHashMap<String, Arc<CompiledIdentity>>,
    pub contributors: AHashMap<String, Arc<CompiledIdentity>>,
    pub maintainer_or_contributor: AHashMap<String, Arc<CompiledIdentity>>,
    pub maintainer_forge_emails: AHashMap<String, Arc<CompiledIdentity>>,
    pub maintainer_or_contributor_forge_emails: AHashMap<String, Arc<CompiledIdentity>>,

    pub forge: Option<Forge>,
    pub rules: ResolvedRules,
    pub protected_branches: KeySet<String>,

    /// Exempt tag ref name to pinned lowercase hex digest.
    pub exempt_tags_sha1: AHashMap<String, String>,
    pub exempt_tags_sha256: AHashMap<String, String>,
}

impl RepoConfig {
    /// Compiles the entry for `repo_uri` out of a parsed config.
    ///
    /// # Errors
    /// Fails when the repository is absent, identities or key material are
    /// malformed or duplicated, or the forge configuration is unusable.
    pub fn compile(config: &ParsedConfig, repo_uri: &str) -> Result<Self, ConfigError> {
        let repo = config
            .repository(repo_uri)
            .ok_or_else(|| ConfigError::Invalid {
                detail: format!("repository {repo_uri} not found in config"),
            })?;

        let maintainer_set: KeySet<&str> =
            repo.maintainers.iter().map(String::as_str).collect();
        let contributor_set: KeySet<&str> =
            repo.contributors.iter().map(String::as_str).collect();

        let mut compiled = Self {
            after_sha1: KeySet::new(),
            after_sha256: KeySet::new(),
            sha1_to_branch: AHashMap::new(),
            branch_to_sha1: AHashMap::new(),
            sha256_to_branch: AHashMap::new(),
            after_sha1_to_sha256: AHashMap::new(),
            maintainers: AHashMap::new(),
            contributors: AHashMap::new(),
            maintainer_or_contributor: AHashMap::new(),
            maintainer_forge_emails: AHashMap::new(),
            maintainer_or_contributor_forge_emails: AHashMap::new(),
            forge: None,
            rules: repo.rules,
            protected_branches: repo.protected_branches.iter().cloned().collect(),
            exempt_tags_sha1: AHashMap::new(),
            exempt_tags_sha256: AHashMap::new(),
        };

        compile_identities(
            &mut compiled,
            repo,
            config.forge_id.as_deref(),
            &maintainer_set,
            &contributor_set,
            repo_uri,
        )?;
        compile_forge(&mut compiled, repo, config.forge_id.as_deref())?;
        compile_exempt_tags(&mut compiled, repo, repo_uri)?;
        compile_after(&mut compiled, repo)?;

        Ok(compiled)
    }
}

fn compile_identities(
    compiled: &mut RepoConfig,
    repo: &ParsedRepository,
    forge_id: Option<&str>,
    maintainer_set: &KeySet<&str>,
    contributor_set: &KeySet<&str>,
    repo_uri: &str,
) -> Result<(), ConfigError> {
    let mut all_emails: KeySet<String> = KeySet::new();
    let mut all_forge_emails: KeySet<String> = KeySet::new();

    for identity in &repo.identities {
        let mut ssh_public_keys = AHashMap::new();
        for key_text in &identity.ssh_public_keys {
            let (blob, key) =
                SshPublicKey::parse_authorized_key(key_text).map_err(|err| {
                    ConfigError::Invalid {
                        detail: format!("bad SSH key for '{}': {err}", identity.email),
                    }
                })?;
            if ssh_public_keys.insert(blob, key).is_some() {
                return Err(ConfigError::Invalid {
                    detail: format!("duplicate SSH key for '{}'", identity.email),
                });
            }
        }

        let entry = Arc::new(CompiledIdentity {
            email: identity.email.clone(),
            forge_username: identity.forge_username.clone(),
            forge_user_id: identity.forge_user_id.clone(),
            ssh_public_keys,
            gpg_public_keys: identity.gpg_public_keys.clone(),
        });

        let forge_email = match (forge_id, &identity.forge_user_id, &identity.forge_username) {
            (Some(GITHUB_FORGE_ID), Some(user_id), Some(username)) => {
                let email = github_user_email(user_id, username);
                if !all_forge_emails.insert(email.clone()) {
                    return Err(ConfigError::Invalid {
                        detail: format!(
                            "duplicate forge email '{email}' in repository {repo_uri}"
                        ),
                    });
                }
                Some(email)
            }
            _ => None,
        };

        let is_maintainer = maintainer_set.contains(&identity.email.as_str());
        let is_contributor = contributor_set.contains(&identity.email.as_str());

        let mut emails = vec![identity.email.clone()];
        emails.extend(identity.additional_emails.iter().cloned());

        for email in emails {
            if !all_emails.insert(email.clone()) {
                return Err(ConfigError::Invalid {
                    detail: format!("duplicate email '{email}' found in repository {repo_uri}"),
                });
            }

            if is_maintainer || is_contributor {
                compiled
                    .maintainer_or_contributor
                    .insert(email.clone(), Arc::clone(&entry));
            }
            if is_maintainer {
                compiled.maintainers.insert(email.clone(), Arc::clone(&entry));
            }
            if is_contributor {
                compiled.contributors.insert(email, Arc::clone(&entry));
            }
        }

        if let Some(forge_email) = forge_email {
            if is_maintainer || is_contributor {
                compiled
                    .maintainer_or_contributor_forge_emails
                    .insert(forge_email.clone(), Arc::clone(&entry));
            }
            if is_maintainer {
                compiled
                    .maintainer_forge_emails
                    .insert(forge_email, Arc::clone(&entry));
            }
        }
    }

    Ok(())
}

fn compile_forge(
    compiled: &mut RepoConfig,
    repo: &ParsedRepository,
    forge_id: Option<&str>,
) -> Result<(), ConfigError> {
    let Some(forge_id) = forge_id else {
        return Ok(());
    };

    if forge_id != GITHUB_FORGE_ID {
        return Err(ConfigError::Invalid {
            detail: format!("unsupported forge: {forge_id}"),
        });
    }

    let rules = repo.forge_rules.as_ref().ok_or_else(|| ConfigError::Invalid {
        detail: "forgeId is set but forgeRules are missing".into(),
    })?;
    let key = rules
        .gpg_public_key
        .as_ref()
        .ok_or_else(|| ConfigError::Invalid {
            detail: "forgeRules.gpgPublicKey must be set when forgeId is configured".into(),
        })?;

    compiled.forge = Some(Forge {
        email: GITHUB_WEB_FLOW_EMAIL.to_owned(),
        gpg_public_key: key.clone(),
        allow_merge_commits: rules.allow_merge_commits,
        allow_content_commits: rules.allow_content_commits,
    });

    Ok(())
}

fn compile_exempt_tags(
    compiled: &mut RepoConfig,
    repo: &ParsedRepository,
    repo_uri: &str,
) -> Result<(), ConfigError> {
    for tag in &repo.exempt_tags {
        if let Some(sha1) = &tag.hash.sha1 {
            if compiled
                .exempt_tags_sha1
                .insert(tag.ref_name.clone(), sha1.clone())
                .is_some()
            {
                return Err(ConfigError::Invalid {
                    detail: format!(
                        "duplicate exempt tag {} found in repository {repo_uri}",
                        tag.ref_name
                    ),
                });
            }
        }
        if let Some(sha256) = &tag.hash.sha256 {
            if compiled
                .exempt_tags_sha256
                .insert(tag.ref_name.clone(), sha256.clone())
                .is_some()
            {
                return Err(ConfigError::Invalid {
                    detail: format!(
                        "duplicate exempt SHA-256 tag {} found in repository {repo_uri}",
                        tag.ref_name
                    ),
                });
            }
        }
    }
    Ok(())
}

fn compile_after(compiled: &mut RepoConfig, repo: &ParsedRepository) -> Result<(), ConfigError> {
    for after in &repo.after {
        let sha1 = after
            .sha1
            .as_deref()
            .map(|hex| {
                ObjectId::from_hex(hex).ok_or(ConfigError::InvalidDigest {
                    field: "after.sha1",
                    got: hex.to_owned(),
                })
            })
            .transpose()?;
        let sha256 = after
            .sha256
            .as_deref()
            .map(|hex| {
                ObjectId::from_hex(hex).ok_or(ConfigError::InvalidDigest {
                    field: "after.sha256",
                    got: hex.to_owned(),
                })
            })
            .transpose()?;

        if let Some(sha1) = sha1 {
            compiled.after_sha1.insert(sha1);
            if let Some(branch) = &after.branch {
                compiled.sha1_to_branch.insert(sha1, branch.clone());
                compiled.branch_to_sha1.insert(branch.clone(), sha1);
            }
        }

        if let Some(sha256) = sha256 {
            compiled.after_sha256.insert(sha256);
            if let Some(branch) = &after.branch {
                compiled.sha256_to_branch.insert(sha256, branch.clone());
            }
        }

        if let (Some(sha1), Some(sha256)) = (sha1, sha256) {
            compiled.after_sha1_to_sha256.insert(sha1, sha256);
        }
    }
    Ok(())
}

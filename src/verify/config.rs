//! Policy configuration file.
//!
//! The persisted config is JSON with `_type` equal to
//! `https://supply-chain-tools.github.io/schemas/gitverify/v0.1`. Top-level
//! identity/rule fields apply to every repository unless the repository
//! entry overrides them. Unknown fields are decode failures.
//!
//! # Rule defaults (when unset)
//! - `allowSshSignatures = false`
//! - `requireSshUserPresent = true`
//! - `requireSshUserVerified = true`
//! - `allowGpgSignatures = false`
//! - `requireSignedTags = true`
//! - `requireMergeCommits = true`
//! - `requireUpToDate = true`

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::stdx::KeySet;

const SCHEMA_PREFIX: &str = "https://supply-chain-tools.github.io/schemas/gitverify/";
const SCHEMA_VERSION: &str = "v0.1";

/// Configuration decode/validation failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// JSON decode failure (including unknown fields).
    Json(serde_json::Error),
    /// Config file could not be read.
    Io { path: PathBuf, err: std::io::Error },
    /// `_type` is not the supported schema or version.
    UnsupportedSchema { got: String },
    /// Repository URI has a bad scheme or missing `.git` suffix.
    InvalidUri { uri: String, detail: String },
    /// A digest field is not well-formed hex.
    InvalidDigest { field: &'static str, got: String },
    /// Duplicate or missing entries in identity/after/exempt lists.
    Invalid { detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "failed to unmarshal config: {err}"),
            Self::Io { path, err } => {
                write!(f, "failed to read config file {}: {err}", path.display())
            }
            Self::UnsupportedSchema { got } => {
                write!(f, "unsupported schema '{got}', expected {SCHEMA_PREFIX}{SCHEMA_VERSION}")
            }
            Self::InvalidUri { uri, detail } => {
                write!(f, "invalid repo uri '{uri}': {detail}")
            }
            Self::InvalidDigest { field, got } => {
                write!(f, "{field} '{got}' is not well-formed hex")
            }
            Self::Invalid { detail } => f.write_str(detail),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Io { err, .. } => Some(err),
            _ => None,
        }
    }
}

/// A person authorized to appear in repository history.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Identity {
    pub email: String,
    #[serde(default)]
    pub additional_emails: Vec<String>,
    #[serde(default)]
    pub gpg_public_keys: Vec<String>,
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge_user_id: Option<String>,
}

/// Signature and branch rules; `None` means "use the default".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Rules {
    pub allow_ssh_signatures: Option<bool>,
    pub require_ssh_user_present: Option<bool>,
    pub require_ssh_user_verified: Option<bool>,
    pub allow_gpg_signatures: Option<bool>,
    pub require_signed_tags: Option<bool>,
    pub require_merge_commits: Option<bool>,
    pub require_up_to_date: Option<bool>,
}

/// Rules for commits made by the forge itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ForgeRules {
    #[serde(default)]
    pub allow_merge_commits: bool,
    #[serde(default)]
    pub allow_content_commits: bool,
    /// Armored OpenPGP key the forge signs with. Required when a forge id
    /// is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_public_key: Option<String>,
}

/// Dual-algorithm digest pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Digests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// A commit marking the validation frontier, optionally tied to a branch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct After {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A tag excused from signature rules, pinned by digest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExemptTag {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub hash: Digests,
}

/// Per-repository entry; any field overrides its top-level counterpart.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Repository {
    pub uri: String,
    #[serde(default)]
    pub after: Vec<After>,
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub protected_branches: Vec<String>,
    #[serde(default)]
    pub forge_rules: Option<ForgeRules>,
    #[serde(default)]
    pub exempt_tags: Vec<ExemptTag>,
}

/// The raw persisted config document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    #[serde(rename = "_type")]
    pub schema: String,
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub protected_branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge_id: Option<String>,
    #[serde(default)]
    pub forge_rules: Option<ForgeRules>,
    pub repositories: Vec<Repository>,
}

/// Effective rules after applying defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRules {
    pub allow_ssh_signatures: bool,
    pub require_ssh_user_present: bool,
    pub require_ssh_user_verified: bool,
    pub allow_gpg_signatures: bool,
    pub require_signed_tags: bool,
    pub require_merge_commits: bool,
    pub require_up_to_date: bool,
}

impl Default for ResolvedRules {
    fn default() -> Self {
        Self {
            allow_ssh_signatures: false,
            require_ssh_user_present: true,
            require_ssh_user_verified: true,
            allow_gpg_signatures: false,
            require_signed_tags: true,
            require_merge_commits: true,
            require_up_to_date: true,
        }
    }
}

impl ResolvedRules {
    /// Applies explicit settings on top of the defaults.
    #[must_use]
    pub fn resolve(rules: Option<&Rules>) -> Self {
        let mut resolved = Self::default();
        if let Some(rules) = rules {
            if let Some(v) = rules.allow_ssh_signatures {
                resolved.allow_ssh_signatures = v;
            }
            if let Some(v) = rules.require_ssh_user_present {
                resolved.require_ssh_user_present = v;
            }
            if let Some(v) = rules.require_ssh_user_verified {
                resolved.require_ssh_user_verified = v;
            }
            if let Some(v) = rules.allow_gpg_signatures {
                resolved.allow_gpg_signatures = v;
            }
            if let Some(v) = rules.require_signed_tags {
                resolved.require_signed_tags = v;
            }
            if let Some(v) = rules.require_merge_commits {
                resolved.require_merge_commits = v;
            }
            if let Some(v) = rules.require_up_to_date {
                resolved.require_up_to_date = v;
            }
        }
        resolved
    }
}

/// One repository's effective configuration after combining top-level and
/// repository-local fields.
#[derive(Clone, Debug)]
pub struct ParsedRepository {
    pub uri: String,
    pub after: Vec<After>,
    pub identities: Vec<Identity>,
    pub maintainers: Vec<String>,
    pub contributors: Vec<String>,
    pub rules: ResolvedRules,
    pub protected_branches: Vec<String>,
    pub forge_rules: Option<ForgeRules>,
    pub exempt_tags: Vec<ExemptTag>,
}

/// Fully validated configuration.
#[derive(Clone, Debug)]
pub struct ParsedConfig {
    pub forge_id: Option<String>,
    pub repositories: Vec<ParsedRepository>,
}

impl ParsedConfig {
    /// Decodes and validates a config document.
    ///
    /// # Errors
    /// Any unknown field, schema mismatch, malformed URI or digest, or
    /// identity-list inconsistency is fatal.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(ConfigError::Json)?;
        parse_config(&config)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_owned(),
            err,
        })?;
        Self::from_json(&text)
    }

    /// Looks up the repository entry for a URI.
    #[must_use]
    pub fn repository(&self, uri: &str) -> Option<&ParsedRepository> {
        self.repositories.iter().find(|r| r.uri == uri)
    }
}

/// Default location of the config file for a forge organization.
#[must_use]
pub fn config_path(home: &Path, forge: &str, org: &str) -> PathBuf {
    home.join(".config")
        .join("gitverify")
        .join(forge)
        .join(org)
        .join("gitverify.json")
}

/// True for exactly 40 lowercase hex characters.
#[must_use]
pub fn is_hex_sha1(text: &str) -> bool {
    text.len() == 40 && text.bytes().all(is_lower_hex)
}

/// True for exactly 64 lowercase hex characters.
#[must_use]
pub fn is_hex_sha256(text: &str) -> bool {
    text.len() == 64 && text.bytes().all(is_lower_hex)
}

#[inline]
fn is_lower_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

fn parse_config(config: &Config) -> Result<ParsedConfig, ConfigError> {
    let version = config
        .schema
        .strip_prefix(SCHEMA_PREFIX)
        .ok_or_else(|| ConfigError::UnsupportedSchema {
            got: config.schema.clone(),
        })?;
    if version != SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchema {
            got: config.schema.clone(),
        });
    }

    let mut repositories = Vec::with_capacity(config.repositories.len());
    for repo in &config.repositories {
        validate_uri(&repo.uri)?;
        validate_after(&repo.after)?;
        validate_exempt_tags(&repo.exempt_tags)?;

        let identities = combine_list(&config.identities, &repo.identities);
        if identities.is_empty() {
            return Err(ConfigError::Invalid {
                detail: format!("no identities specified for {}", repo.uri),
            });
        }

        let maintainers = combine_list(&config.maintainers, &repo.maintainers);
        if maintainers.is_empty() {
            return Err(ConfigError::Invalid {
                detail: format!("no maintainers specified for {}", repo.uri),
            });
        }

        let contributors = combine_list(&config.contributors, &repo.contributors);
        ensure_roles_consistent(&identities, &maintainers, &contributors)?;

        let rules = repo.rules.as_ref().or(config.rules.as_ref());
        if rules.is_none() {
            return Err(ConfigError::Invalid {
                detail: format!("no rules specified for {}", repo.uri),
            });
        }

        repositories.push(ParsedRepository {
            uri: repo.uri.clone(),
            after: repo.after.clone(),
            identities,
            maintainers,
            contributors,
            rules: ResolvedRules::resolve(rules),
            protected_branches: combine_list(
                &config.protected_branches,
                &repo.protected_branches,
            ),
            forge_rules: repo
                .forge_rules
                .clone()
                .or_else(|| config.forge_rules.clone()),
            exempt_tags: repo.exempt_tags.clone(),
        });
    }

    Ok(ParsedConfig {
        forge_id: config.forge_id.clone(),
        repositories,
    })
}

/// Local list wins entirely when non-empty; no element-level merging.
fn combine_list<T: Clone>(global: &[T], local: &[T]) -> Vec<T> {
    if local.is_empty() {
        global.to_vec()
    } else {
        local.to_vec()
    }
}

fn ensure_roles_consistent(
    identities: &[Identity],
    maintainers: &[String],
    contributors: &[String],
) -> Result<(), ConfigError> {
    let identity_emails: KeySet<String> =
        identities.iter().map(|i| i.email.clone()).collect();
    let maintainer_set: KeySet<String> = maintainers.iter().cloned().collect();
    let contributor_set: KeySet<String> = contributors.iter().cloned().collect();

    for maintainer in maintainers {
        if contributor_set.contains(maintainer) {
            return Err(ConfigError::Invalid {
                detail: format!("'{maintainer}' must be maintainer or contributor not both"),
            });
        }
    }

    let missing_maintainers = maintainer_set.difference(&identity_emails);
    if !missing_maintainers.is_empty() {
        let mut names = missing_maintainers.values();
        names.sort();
        return Err(ConfigError::Invalid {
            detail: format!("maintainers '{}' not present in identities", names.join(",")),
        });
    }

    let missing_contributors = contributor_set.difference(&identity_emails);
    if !missing_contributors.is_empty() {
        let mut names = missing_contributors.values();
        names.sort();
        return Err(ConfigError::Invalid {
            detail: format!(
                "contributors '{}' not present in identities",
                names.join(",")
            ),
        });
    }

    Ok(())
}

fn validate_uri(uri: &str) -> Result<(), ConfigError> {
    // SPDX download-location schemes:
    // https://spdx.github.io/spdx-spec/v2.3/package-information/
    let rest = uri
        .strip_prefix("git+https://")
        .or_else(|| uri.strip_prefix("git+ssh://"))
        .ok_or_else(|| ConfigError::InvalidUri {
            uri: uri.to_owned(),
            detail: "expected scheme 'git+https' or 'git+ssh'".into(),
        })?;

    if rest.is_empty() {
        return Err(ConfigError::InvalidUri {
            uri: uri.to_owned(),
            detail: "missing host".into(),
        });
    }

    if !uri.ends_with(".git") {
        return Err(ConfigError::InvalidUri {
            uri: uri.to_owned(),
            detail: "expected '.git' suffix".into(),
        });
    }

    Ok(())
}

fn validate_after(after: &[After]) -> Result<(), ConfigError> {
    let mut branches: KeySet<&str> = KeySet::new();
    let mut sha1s: KeySet<&str> = KeySet::new();
    let mut sha256s: KeySet<&str> = KeySet::new();

    for entry in after {
        if entry.sha1.is_none() && entry.sha256.is_none() {
            return Err(ConfigError::Invalid {
                detail: "either after.sha1 or after.sha256 must be set, or both".into(),
            });
        }

        if let Some(sha1) = &entry.sha1 {
            if !is_hex_sha1(sha1) {
                return Err(ConfigError::InvalidDigest {
                    field: "after.sha1",
                    got: sha1.clone(),
                });
            }
            if !sha1s.insert(sha1) {
                return Err(ConfigError::Invalid {
                    detail: format!("after sha1 '{sha1}' must be unique"),
                });
            }
        }

        if let Some(sha256) = &entry.sha256 {
            if !is_hex_sha256(sha256) {
                return Err(ConfigError::InvalidDigest {
                    field: "after.sha256",
                    got: sha256.clone(),
                });
            }
            if !sha256s.insert(sha256) {
                return Err(ConfigError::Invalid {
                    detail: format!("after sha256 '{sha256}' must be unique"),
                });
            }
        }

        if let Some(branch) = &entry.branch {
            if !branches.insert(branch) {
                return Err(ConfigError::Invalid {
                    detail: format!("duplicate after branch '{branch}'"),
                });
            }
        }
    }

    Ok(())
}

fn validate_exempt_tags(tags: &[ExemptTag]) -> Result<(), ConfigError> {
    let mut refs: KeySet<&str> = KeySet::new();
    for tag in tags {
        if !refs.insert(&tag.ref_name) {
            return Err(ConfigError::Invalid {
                detail: format!("duplicate exempt tag '{}'", tag.ref_name),
            });
        }

        if tag.hash.sha1.is_none() && tag.hash.sha256.is_none() {
            return Err(ConfigError::Invalid {
                detail: format!(
                    "at least one of hash.sha1 and hash.sha256 must be set for exempt tag '{}'",
                    tag.ref_name
                ),
            });
        }

        if let Some(sha1) = &tag.hash.sha1 {
            if !is_hex_sha1(sha1) {
                return Err(ConfigError::InvalidDigest {
                    field: "exemptTags.hash.sha1",
                    got: sha1.clone(),
                });
            }
        }
        if let Some(sha256) = &tag.hash.sha256 {
            if !is_hex_sha256(sha256) {
                return Err(ConfigError::InvalidDigest {
                    field: "exemptTags.hash.sha256",
                    got: sha256.clone(),
                });
            }
        }
    }
    Ok(())
}

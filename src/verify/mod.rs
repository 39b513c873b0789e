//! Repository policy verification.
//!
//! Enforces an identity/rules configuration over a repository's full
//! object graph: per-commit signatures (SSH and OpenPGP) and identities,
//! tag signing and exemptions, protected-branch merge semantics, the
//! after frontier, and local-state continuity between runs.
//!
//! The verifier is single-threaded and cooperative: it owns one
//! re-hasher per digest algorithm and is created once per repository per
//! run. The only subprocess dependency is `git merge-base`/`merge-tree`
//! behind [`MergeOps`].

pub mod after_candidates;
pub mod config;
pub mod errors;
pub mod git_cli;
pub mod gpg;
pub mod local_state;
pub mod repo_config;
pub mod ssh;
pub mod verifier;

pub use after_candidates::after_candidates;
pub use config::{
    config_path, After, Config, ConfigError, Digests, ExemptTag, ForgeRules, Identity,
    ParsedConfig, ParsedRepository, ResolvedRules, Rules,
};
pub use errors::VerifyError;
pub use git_cli::{GitCli, GitCliError, MergeOps};
pub use local_state::{local_state_path, Clock, LocalState, RecordedRef, SystemClock};
pub use repo_config::{CompiledIdentity, Forge, RepoConfig};
pub use ssh::{SshError, SshPublicKey, SshSignature, U2fFlags};
pub use verifier::{CommitMetadata, SignatureType, Verifier, VerifyOptions};

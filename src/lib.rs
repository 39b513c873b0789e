//! Supply-chain integrity toolkit for Git repositories.
//!
//! Three tightly coupled subsystems over one decoded object graph:
//!
//! - **Re-hashing** ([`hashing`]): byte-exact reproduction of Git's
//!   canonical object serialization, digested under any algorithm — the
//!   SHA-1 self-check and the dual-digest (SHA-256) identity scheme both
//!   build on it.
//! - **Policy verification** ([`verify`]): signatures (SSH and OpenPGP),
//!   identity rules, protected-branch merge semantics, the after
//!   frontier, and local-state continuity between runs.
//! - **Typo-aware search** ([`search`] + [`scan`]): a trie over search
//!   terms and generated typo variations, streamed over repository blobs
//!   or working trees by a multi-repository worker pool.
//!
//! Repository access is abstracted behind [`git::RepoSource`]; the crate
//! performs no network I/O and shells out only for `git merge-base` and
//! `git merge-tree`.
//!
//! High-level flow:
//! 1. A backend feeds encoded objects to [`git::RepoState::load`].
//! 2. [`verify::Verifier`] enforces the configured policy over the state,
//!    re-hashing every commit via [`hashing::GitHasher`].
//! 3. [`scan::scan_repositories`] runs a shared [`search::Search`] trie
//!    over blob bytes across many repositories in parallel.

pub mod git;
pub mod hashing;
pub mod provenance;
pub mod scan;
pub mod search;
pub mod stdx;
pub mod verify;

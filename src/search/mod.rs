//! Typo-aware multi-pattern search.
//!
//! Builds a trie over a set of search terms plus systematically generated
//! typo variations (character omission/duplication/swap, part reordering,
//! QWERTY and homoglyph substitution, delimiter insertion, and for domain
//! terms a fan-out over the known TLD table), then streams input bytes
//! through it producing match records with optional context.
//!
//! The trie is built once and shared read-only; per-scan mutable state
//! lives in the matcher's local buffers.

pub mod charset;
pub mod engine;
pub mod params;
pub mod result;
pub mod tlds;
pub mod trie;
pub mod typo;

pub use engine::Search;
pub use params::{CharacterClass, MatchMode, Parameters};
pub use result::{KeywordMatch, SearchError, SearchMatch};
pub use trie::TrieStats;

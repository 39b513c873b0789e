//! Match records.

use std::fmt;
use std::sync::Arc;

use crate::stdx::KeySet;

/// Search engine errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum SearchError {
    /// A byte outside the character class, with `fail_on_invalid` set.
    InvalidCharacter { ch: char },
    /// A search term the configured class cannot represent.
    InvalidTerm { term: String, detail: String },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCharacter { ch } => write!(f, "invalid character '{ch}'"),
            Self::InvalidTerm { term, detail } => write!(f, "invalid term '{term}': {detail}"),
        }
    }
}

impl std::error::Error for SearchError {}

/// One trie entry: a registered variation and the term it came from.
#[derive(Clone, Debug)]
pub struct KeywordMatch {
    /// The exact string registered in the trie.
    pub variation: String,
    /// The search term that produced the variation. For domain terms this
    /// is the stem with the set of observed TLDs, e.g. `foobar.{com,net}`.
    pub original: String,
    /// For domain terms, every `stem.tld` actually given as input; used by
    /// the typo-only filter.
    pub alt_originals: Option<Arc<KeySet<String>>>,
    /// The variation equals a normalized input term (not a typo).
    pub exact_candidate: bool,
}

impl KeywordMatch {
    #[must_use]
    pub fn new(
        variation: impl Into<String>,
        original: impl Into<String>,
        alt_originals: Option<Arc<KeySet<String>>>,
        exact_candidate: bool,
    ) -> Self {
        Self {
            variation: variation.into(),
            original: original.into(),
            alt_originals,
            exact_candidate,
        }
    }
}

/// One reported match.
///
/// Offsets are byte offsets into the scanned input. `start_of_word` /
/// `end_of_word` delimit the containing word; `start_of_match` /
/// `end_of_match` delimit the trie hit, which may be narrower when
/// anchoring is off.
#[derive(Clone, Debug)]
pub struct SearchMatch {
    pub keyword: Arc<KeywordMatch>,
    /// 1-based, counted by `\n` bytes.
    pub line_number: u32,
    pub matched_text: String,
    pub context_before: String,
    pub context_after: String,
    pub start_of_word: usize,
    pub end_of_word: usize,
    pub start_of_match: usize,
    pub end_of_match: usize,
    pub start_of_line: usize,
    /// Context hit the byte budget before the line count (left side).
    pub trimmed_left: bool,
    /// Context hit the byte budget before the line count (right side).
    pub trimmed_right: bool,
}

impl SearchMatch {
    /// Identity of the matched text with its context, used to coalesce
    /// identical findings across branches and commits.
    #[must_use]
    pub fn match_id(&self) -> String {
        format!(
            "{}{}{}",
            self.context_before, self.matched_text, self.context_after
        )
    }

    /// Identity of the originating search term.
    #[must_use]
    pub fn term_id(&self) -> &str {
        &self.keyword.original
    }
}

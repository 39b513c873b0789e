//! Multi-pattern suffix trie.
//!
//! Nodes live in one arena and reference each other by index, keeping the
//! hot loop free of pointer chasing through separate allocations. Each
//! node has:
//!
//! - an ASCII child array indexed by the character class's compact
//!   ordinal (O(1) dispatch in the ASCII fast path),
//! - a sorted `char` vector for non-ASCII children — linear scan while
//!   small, binary search once it grows past [`SMALL_NODE_MAX`] entries,
//! - the [`KeywordMatch`] records that end at this node.

use std::sync::Arc;

use crate::stdx::KeySet;

use super::charset::{CharsetConfig, INVALID};
use super::result::KeywordMatch;

/// Index of the root node.
pub const ROOT: u32 = 0;
/// Sentinel for "no child".
pub const NO_NODE: u32 = u32::MAX;

/// Linear-scan threshold for the non-ASCII child list.
const SMALL_NODE_MAX: usize = 15;

/// Size and shape counters, reported by the scan pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrieStats {
    /// Registered non-exact variations.
    pub variations: usize,
    /// Total node count.
    pub nodes: usize,
    /// Approximate resident size.
    pub bytes: u64,
}

struct TrieNode {
    /// Children by ASCII ordinal; length is the mask size.
    ascii: Box<[u32]>,
    /// Sorted non-ASCII edge labels, parallel to `unicode`.
    runes: Vec<char>,
    unicode: Vec<u32>,
    matches: Vec<Arc<KeywordMatch>>,
}

impl TrieNode {
    fn new(mask_size: u8) -> Self {
        Self {
            ascii: vec![NO_NODE; mask_size as usize].into_boxed_slice(),
            runes: Vec::new(),
            unicode: Vec::new(),
            matches: Vec::new(),
        }
    }

    fn next_unicode(&self, c: char) -> u32 {
        if self.runes.len() <= SMALL_NODE_MAX {
            for (i, &r) in self.runes.iter().enumerate() {
                if r == c {
                    return self.unicode[i];
                }
            }
            NO_NODE
        } else {
            match self.runes.binary_search(&c) {
                Ok(i) => self.unicode[i],
                Err(_) => NO_NODE,
            }
        }
    }
}

/// The trie itself.
pub struct Trie {
    nodes: Vec<TrieNode>,
    mask_size: u8,
}

impl Trie {
    /// Creates a trie with an empty root sized for the class's mask.
    #[must_use]
    pub fn new(mask_size: u8) -> Self {
        Self {
            nodes: vec![TrieNode::new(mask_size)],
            mask_size,
        }
    }

    /// Registers a term verbatim as an exact match.
    pub fn add_exact(
        &mut self,
        term: &str,
        alt_originals: Option<Arc<KeySet<String>>>,
        config: &CharsetConfig,
    ) {
        let keyword = KeywordMatch::new(term, term, alt_originals, true);
        self.add_word(term, keyword, config);
    }

    /// Registers a variation of a term.
    pub fn add_variation(
        &mut self,
        variation: &str,
        original: &str,
        alt_originals: Option<Arc<KeySet<String>>>,
        config: &CharsetConfig,
        exact_candidate: bool,
    ) {
        let keyword = KeywordMatch::new(variation, original, alt_originals, exact_candidate);
        self.add_word(variation, keyword, config);
    }

    fn add_word(&mut self, word: &str, keyword: KeywordMatch, config: &CharsetConfig) {
        let mut node = ROOT;
        for c in word.chars() {
            node = if (c as u32) < 128 {
                let ordinal = config.mask[c as usize];
                debug_assert_ne!(ordinal, INVALID, "term byte outside character class");
                let existing = self.nodes[node as usize].ascii[ordinal as usize];
                if existing != NO_NODE {
                    existing
                } else {
                    let fresh = self.push_node();
                    self.nodes[node as usize].ascii[ordinal as usize] = fresh;
                    fresh
                }
            } else {
                let existing = self.nodes[node as usize].next_unicode(c);
                if existing != NO_NODE {
                    existing
                } else {
                    let fresh = self.push_node();
                    self.insert_unicode(node, c, fresh);
                    fresh
                }
            };
        }

        let matches = &mut self.nodes[node as usize].matches;
        let already_present = matches
            .iter()
            .any(|m| m.variation == keyword.variation && m.original == keyword.original);
        if !already_present {
            matches.push(Arc::new(keyword));
        }
    }

    fn push_node(&mut self) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(TrieNode::new(self.mask_size));
        index
    }

    fn insert_unicode(&mut self, node: u32, c: char, child: u32) {
        let node = &mut self.nodes[node as usize];
        let at = node.runes.partition_point(|&r| r < c);
        node.runes.insert(at, c);
        node.unicode.insert(at, child);
    }

    /// ASCII step: child for a mask ordinal, or [`NO_NODE`].
    #[inline]
    #[must_use]
    pub fn next_ascii(&self, node: u32, ordinal: u8) -> u32 {
        self.nodes[node as usize].ascii[ordinal as usize]
    }

    /// Non-ASCII step.
    #[inline]
    #[must_use]
    pub fn next_unicode(&self, node: u32, c: char) -> u32 {
        self.nodes[node as usize].next_unicode(c)
    }

    /// Keyword matches terminating at `node`.
    #[inline]
    #[must_use]
    pub fn matches(&self, node: u32) -> &[Arc<KeywordMatch>] {
        &self.nodes[node as usize].matches
    }

    /// True when any keyword terminates at `node`.
    #[inline]
    #[must_use]
    pub fn has_matches(&self, node: u32) -> bool {
        !self.nodes[node as usize].matches.is_empty()
    }

    /// Size and shape counters.
    #[must_use]
    pub fn stats(&self) -> TrieStats {
        let mut stats = TrieStats {
            nodes: self.nodes.len(),
            ..TrieStats::default()
        };

        for node in &self.nodes {
            stats.variations += node.matches.iter().filter(|m| !m.exact_candidate).count();
            stats.bytes += std::mem::size_of::<TrieNode>() as u64
                + node.ascii.len() as u64 * 4
                + node.runes.capacity() as u64 * 4
                + node.unicode.capacity() as u64 * 4
                + node.matches.capacity() as u64 * std::mem::size_of::<usize>() as u64;
        }

        stats
    }

    /// Every registered variation string, sorted.
    #[must_use]
    pub fn all_variations(&self) -> Vec<String> {
        let mut seen: KeySet<String> = KeySet::new();
        for node in &self.nodes {
            for keyword in &node.matches {
                seen.insert(keyword.variation.clone());
            }
        }
        let mut out = seen.values();
        out.sort();
        out
    }
}

//! Trie construction and the streaming matcher.
//!
//! # Matching model
//! The matcher scans input bytes once, maintaining a set of *active* trie
//! positions (each remembering where its match began) and, when the end is
//! not anchored, a set of *parked* positions — completed matches whose
//! greedy extension continued past a hit. Positions are small `Copy`
//! records kept in reused buffers, so the inner loop performs no
//! allocation.
//!
//! Per input byte:
//! - A byte outside the character class flushes both sets (emitting the
//!   positions whose node carries keyword matches) and restarts matching
//!   at the next word character; with `fail_on_invalid` it errors instead.
//! - Otherwise every active position steps through the trie by the byte's
//!   mask ordinal (or by decoded rune for non-ASCII input).
//! - Without begin-anchoring a fresh root position is seeded at every
//!   byte, so matches may start mid-word.
//!
//! Guarantees: at most one result per `(line, word-bounds, original-term)`,
//! results in encounter order by start offset, line numbers counted by
//! `\n` bytes.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::warn;
use unicode_categories::UnicodeCategories;

use crate::stdx::KeySet;

use super::charset::{CharsetConfig, INVALID};
use super::params::{CharacterClass, MatchMode, Parameters};
use super::result::{SearchError, SearchMatch};
use super::tlds::{is_known_tld, TLDS};
use super::trie::{Trie, TrieStats, NO_NODE, ROOT};
use super::typo::{
    combinatorial_reorder, duplicate_one_character, insert_delimiter, keyboard_substitution,
    normalize, omit_one_character, swap_adjacent_characters, KeyboardMap,
};

/// One in-flight trie position.
#[derive(Clone, Copy, Debug)]
struct Position {
    node: u32,
    start_of_match: usize,
    end_of_match: usize,
}

/// A configured search engine: one trie over all terms and their
/// variations, shared read-only by every scan.
pub struct Search {
    trie: Trie,
    params: Parameters,
    charset: CharsetConfig,
    remove_repeated_delimiters: bool,
    filter_out_exact: bool,
}

impl Search {
    /// Builds the engine: compiles the character class, registers every
    /// term (deduplicated) with its generated variations.
    ///
    /// # Errors
    /// Fails when a term contains characters outside the class, or for
    /// Domain terms that are not `stem.tld` with a known TLD.
    pub fn new(terms: &[String], params: Parameters) -> Result<Self, SearchError> {
        let charset = CharsetConfig::new(params.class, params.mode.normalizes(), terms);
        let mut trie = Trie::new(charset.mask_size);

        if params.class == CharacterClass::Domain {
            add_domain_terms(&mut trie, terms, &charset, params.mode)?;
        } else {
            let mut added: KeySet<&str> = KeySet::new();
            for term in terms {
                if added.insert(term) {
                    add_term(&mut trie, term, &charset, params.mode, params.class)?;
                }
            }
        }

        let remove_repeated_delimiters =
            !(params.class == CharacterClass::Url || params.mode == MatchMode::Exact);
        let filter_out_exact = params.mode == MatchMode::TypoOnly;

        Ok(Self {
            trie,
            params,
            charset,
            remove_repeated_delimiters,
            filter_out_exact,
        })
    }

    /// The engine's parameters.
    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Trie size counters.
    #[must_use]
    pub fn stats(&self) -> TrieStats {
        self.trie.stats()
    }

    /// Every registered variation, sorted.
    #[must_use]
    pub fn variations(&self) -> Vec<String> {
        self.trie.all_variations()
    }

    /// Scans one byte buffer, returning matches in encounter order.
    ///
    /// # Errors
    /// `InvalidCharacter` when a byte is outside the character class and
    /// `fail_on_invalid` is set.
    pub fn matches(&self, data: &[u8]) -> Result<Vec<SearchMatch>, SearchError> {
        let params = &self.params;
        let len = data.len();

        let mut results: Vec<SearchMatch> = Vec::new();

        let buffer_capacity = if params.anchor_beginning { 4 } else { 64 };
        let mut active: Vec<Position> = Vec::with_capacity(buffer_capacity);
        let mut stepped: Vec<Position> = Vec::with_capacity(buffer_capacity);
        let mut parked: Vec<Position> = Vec::with_capacity(buffer_capacity);

        let mut line_number: u32 = 1;
        let mut start_of_line: usize = 0;
        let mut i: usize = 0;
        let mut need_seek = false;

        'words: loop {
            if need_seek {
                // Find the next word character.
                loop {
                    if i == len {
                        return Ok(results);
                    }
                    let (c, width, valid) = self.classify(data, i);
                    if valid {
                        break;
                    }
                    if c == '\n' {
                        line_number += 1;
                        start_of_line = i + width;
                    }
                    i += width;
                }
            }
            need_seek = true;

            active.clear();
            parked.clear();
            active.push(Position {
                node: ROOT,
                start_of_match: i,
                end_of_match: 0,
            });
            let start_of_word = i;
            let mut last_char = '\0';

            loop {
                if i == len {
                    for position in &active {
                        self.emit(
                            &mut results,
                            data,
                            position.node,
                            line_number,
                            position.start_of_match,
                            i,
                            start_of_word,
                            i,
                            start_of_line,
                        );
                    }
                    for position in &parked {
                        self.emit(
                            &mut results,
                            data,
                            position.node,
                            line_number,
                            position.start_of_match,
                            position.end_of_match,
                            start_of_word,
                            i,
                            start_of_line,
                        );
                    }
                    return Ok(results);
                }

                let (c, width, valid) = self.classify(data, i);

                if valid
                    && self.remove_repeated_delimiters
                    && c == '-'
                    && last_char == '-'
                {
                    // Consecutive delimiters collapse during matching.
                    i += 1;
                    continue;
                }

                if !valid {
                    if params.fail_on_invalid {
                        return Err(SearchError::InvalidCharacter { ch: c });
                    }

                    for position in &active {
                        self.emit(
                            &mut results,
                            data,
                            position.node,
                            line_number,
                            position.start_of_match,
                            i,
                            start_of_word,
                            i,
                            start_of_line,
                        );
                    }
                    for position in &parked {
                        self.emit(
                            &mut results,
                            data,
                            position.node,
                            line_number,
                            position.start_of_match,
                            position.end_of_match,
                            start_of_word,
                            i,
                            start_of_line,
                        );
                    }

                    if c == '\n' {
                        line_number += 1;
                        start_of_line = i + width;
                    }
                    i += width;
                    continue 'words;
                }

                stepped.clear();
                for index in 0..active.len() {
                    let position = active[index];
                    let child = self.step(position.node, c, data, i);

                    if !params.anchor_end && self.trie.has_matches(position.node) {
                        parked.push(Position {
                            node: position.node,
                            start_of_match: position.start_of_match,
                            end_of_match: i,
                        });
                    }

                    if child != NO_NODE {
                        stepped.push(Position {
                            node: child,
                            start_of_match: position.start_of_match,
                            end_of_match: 0,
                        });
                    }
                }
                std::mem::swap(&mut active, &mut stepped);

                if params.anchor_beginning && active.is_empty() {
                    // Nothing can match in this word anymore; skip to its end.
                    let mut current_char = c;
                    let mut current_width = width;
                    let mut hit_invalid = false;
                    loop {
                        i += current_width;
                        if i == len {
                            break;
                        }
                        let (c2, w2, v2) = self.classify(data, i);
                        current_char = c2;
                        current_width = w2;
                        if !v2 {
                            hit_invalid = true;
                            break;
                        }
                    }

                    if hit_invalid && params.fail_on_invalid {
                        return Err(SearchError::InvalidCharacter { ch: current_char });
                    }

                    for position in &parked {
                        self.emit(
                            &mut results,
                            data,
                            position.node,
                            line_number,
                            position.start_of_match,
                            position.end_of_match,
                            start_of_word,
                            i,
                            start_of_line,
                        );
                    }
                    parked.clear();

                    if i == len {
                        return Ok(results);
                    }
                    if current_char == '\n' {
                        line_number += 1;
                        start_of_line = i + current_width;
                    }
                    i += current_width;
                    continue 'words;
                }

                last_char = c;
                i += width;

                if !params.anchor_beginning {
                    active.push(Position {
                        node: ROOT,
                        start_of_match: i,
                        end_of_match: 0,
                    });
                }
            }
        }
    }

    /// Scans several buffers, logging and skipping ones with invalid
    /// characters instead of failing the batch.
    pub fn matches_permissive<T: AsRef<[u8]>>(&self, inputs: &[T]) -> Vec<SearchMatch> {
        let mut results = Vec::new();
        for input in inputs {
            match self.matches(input.as_ref()) {
                Ok(mut found) => results.append(&mut found),
                Err(err) => warn!(%err, "skipping input with invalid characters"),
            }
        }
        results
    }

    /// Classifies the byte/char at `i`: `(char, width, is-word-char)`.
    #[inline]
    fn classify(&self, data: &[u8], i: usize) -> (char, usize, bool) {
        let b = data[i];
        if b < 128 || !self.charset.unicode {
            (b as char, 1, self.charset.mask[b as usize] != INVALID)
        } else {
            let (c, width) = decode_char(data, i);
            let valid =
                c != char::REPLACEMENT_CHARACTER && self.charset.is_valid_char(c);
            (c, width, valid)
        }
    }

    /// Steps one trie position by the character at `i`.
    #[inline]
    fn step(&self, node: u32, c: char, data: &[u8], i: usize) -> u32 {
        if (c as u32) < 128 {
            self.trie.next_ascii(node, self.charset.mask[data[i] as usize])
        } else if self.charset.normalized {
            let lowered = c.to_lowercase().next().unwrap_or(c);
            self.trie.next_unicode(node, lowered)
        } else {
            self.trie.next_unicode(node, c)
        }
    }

    /// Emits the keyword matches ending at `node`, applying dedup and the
    /// typo-only filter, attaching context when configured.
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        results: &mut Vec<SearchMatch>,
        data: &[u8],
        node: u32,
        line_number: u32,
        start_of_match: usize,
        end_of_match: usize,
        start_of_word: usize,
        end_of_word: usize,
        start_of_line: usize,
    ) {
        if !self.trie.has_matches(node) {
            return;
        }

        for keyword in self.trie.matches(node) {
            let duplicate = results
                .iter()
                .rev()
                .take_while(|prev| prev.line_number == line_number)
                .any(|prev| {
                    prev.start_of_word == start_of_word
                        && prev.end_of_word == end_of_word
                        && prev.keyword.original == keyword.original
                });
            if duplicate {
                continue;
            }

            if self.filter_out_exact {
                // Delimiter normalization and variation overlap mean a hit
                // is not necessarily a typo; compare against the original
                // here.
                let word = lowercase_text(&data[start_of_word..end_of_word]);
                let is_typo = match self.params.class {
                    CharacterClass::Package => {
                        let folded_word = normalize(&word, &self.charset)
                            .unwrap_or_else(|_| word.clone());
                        let folded_original = normalize(&keyword.original, &self.charset)
                            .unwrap_or_else(|_| keyword.original.to_lowercase());
                        folded_word != folded_original
                    }
                    CharacterClass::Domain => keyword
                        .alt_originals
                        .as_ref()
                        .is_some_and(|alt| !alt.contains(&word)),
                    _ => {
                        let a = if start_of_word < start_of_match {
                            start_of_match - 1
                        } else {
                            start_of_match
                        };
                        let b = if end_of_word > end_of_match {
                            end_of_match + 1
                        } else {
                            end_of_match
                        };
                        !lowercase_text(&data[a..b]).contains(&keyword.original)
                    }
                };
                if !is_typo {
                    continue;
                }
            }

            let matched_text =
                String::from_utf8_lossy(&data[start_of_word..end_of_word]).into_owned();

            let (context_before, context_after, trimmed_left, trimmed_right) =
                if self.params.include_context {
                    self.extract_context(data, start_of_word, end_of_word, start_of_line)
                } else {
                    (String::new(), String::new(), false, false)
                };

            results.push(SearchMatch {
                keyword: Arc::clone(keyword),
                line_number,
                matched_text,
                context_before,
                context_after,
                start_of_word,
                end_of_word,
                start_of_match,
                end_of_match,
                start_of_line,
                trimmed_left,
                trimmed_right,
            });
        }
    }

    /// Context window: up to `lines_before`/`lines_after` lines, bounded
    /// by a byte budget of `4 × context_columns` per requested line
    /// (`context_columns` alone inside the matched line).
    fn extract_context(
        &self,
        data: &[u8],
        start_of_word: usize,
        end_of_word: usize,
        start_of_line: usize,
    ) -> (String, String, bool, bool) {
        let columns = self.params.context_columns;
        let lines_before = self.params.lines_before;
        let lines_after = self.params.lines_after;

        let mut trimmed_left = false;
        let context_start = if lines_before == 0 {
            if start_of_line + columns < start_of_word {
                trimmed_left = true;
                start_of_word - columns
            } else {
                start_of_line
            }
        } else {
            let budget = (lines_before * 4 * columns) as isize;
            let limit = start_of_word as isize - budget;
            let mut newlines: isize = -1;
            let mut pos = start_of_word as isize - 1;
            loop {
                if pos < 0 {
                    break 0;
                }
                if data[pos as usize] == b'\n' {
                    newlines += 1;
                    if newlines == lines_before as isize {
                        break (pos + 1) as usize;
                    }
                }
                if pos < limit {
                    trimmed_left = true;
                    break limit as usize;
                }
                pos -= 1;
            }
        };

        let mut trimmed_right = false;
        let budget_after = if lines_after > 0 {
            lines_after * 4 * columns
        } else {
            columns
        };
        let mut newlines: isize = -1;
        let mut context_end = end_of_word;
        loop {
            if context_end == data.len() {
                break;
            }
            if data[context_end] == b'\n' {
                newlines += 1;
                if newlines == lines_after as isize {
                    break;
                }
            }
            if context_end - end_of_word > budget_after {
                context_end = end_of_word + budget_after;
                trimmed_right = true;
                break;
            }
            context_end += 1;
        }

        (
            sanitize(&data[context_start..start_of_word]),
            sanitize(&data[end_of_word..context_end]),
            trimmed_left,
            trimmed_right,
        )
    }
}

/// Registers one non-domain term with its variations.
fn add_term(
    trie: &mut Trie,
    term: &str,
    charset: &CharsetConfig,
    mode: MatchMode,
    class: CharacterClass,
) -> Result<(), SearchError> {
    let normalized = normalize(term, charset)?;

    if mode == MatchMode::Exact {
        trie.add_exact(term, None, charset);
        return Ok(());
    }

    trie.add_variation(&normalized, term, None, charset, true);

    if mode.generates_typos() {
        for variation in duplicate_one_character(&normalized) {
            trie.add_variation(&variation, term, None, charset, false);
        }
        for variation in omit_one_character(&normalized) {
            trie.add_variation(&variation, term, None, charset, false);
        }
        for variation in swap_adjacent_characters(&normalized) {
            trie.add_variation(&variation, term, None, charset, false);
        }
        if class == CharacterClass::Package {
            for variation in combinatorial_reorder(&normalized) {
                trie.add_variation(&variation, term, None, charset, false);
            }
        }
        for variation in keyboard_substitution(&normalized, KeyboardMap::Qwerty) {
            trie.add_variation(&variation, term, None, charset, false);
        }
        for variation in insert_delimiter(&normalized) {
            trie.add_variation(&variation, term, None, charset, false);
        }
    }

    Ok(())
}

/// Registers domain terms. Each term must be `stem.tld` with a known TLD;
/// variations of a stem fan out across every known TLD, and the recorded
/// original becomes `stem.{tld1,tld2,…}` over the TLDs seen in the input.
fn add_domain_terms(
    trie: &mut Trie,
    terms: &[String],
    charset: &CharsetConfig,
    mode: MatchMode,
) -> Result<(), SearchError> {
    let mut seen: KeySet<&str> = KeySet::new();
    // Stem registration order is kept so trie construction is
    // deterministic across runs.
    let mut stems: Vec<String> = Vec::new();
    let mut stem_tlds: AHashMap<String, KeySet<String>> = AHashMap::new();

    for term in terms {
        if !seen.insert(term) {
            continue;
        }

        let normalized = normalize(term, charset)?;
        let parts: Vec<&str> = normalized.split('.').collect();
        if parts.len() != 2 {
            return Err(SearchError::InvalidTerm {
                term: term.clone(),
                detail: "subdomains are not supported".into(),
            });
        }
        let (stem, tld) = (parts[0], parts[1]);

        if !is_known_tld(tld) {
            return Err(SearchError::InvalidTerm {
                term: term.clone(),
                detail: format!("not a valid tld '{tld}'"),
            });
        }

        let entry = stem_tlds.entry(stem.to_owned()).or_insert_with(|| {
            stems.push(stem.to_owned());
            KeySet::new()
        });
        entry.insert(tld.to_owned());

        if mode == MatchMode::Exact {
            trie.add_exact(term, None, charset);
        } else {
            trie.add_variation(&normalized, term, None, charset, true);
        }
    }

    if !mode.generates_typos() {
        return Ok(());
    }

    for stem in stems {
        let tlds = &stem_tlds[&stem];
        let mut tld_list = tlds.values();
        tld_list.sort();

        let original = format!("{stem}.{{{}}}", tld_list.join(","));
        let mut alt = KeySet::new();
        for tld in &tld_list {
            alt.insert(format!("{stem}.{tld}"));
        }
        let alt = Some(Arc::new(alt));

        for tld in TLDS {
            if !tlds.contains(&(*tld).to_owned()) {
                trie.add_variation(
                    &format!("{stem}.{tld}"),
                    &original,
                    alt.clone(),
                    charset,
                    false,
                );
            }
        }

        let fan_out = |variations: Vec<String>, trie: &mut Trie| {
            for variation in variations {
                for tld in TLDS {
                    trie.add_variation(
                        &format!("{variation}.{tld}"),
                        &original,
                        alt.clone(),
                        charset,
                        false,
                    );
                }
            }
        };

        fan_out(duplicate_one_character(&stem), trie);
        fan_out(omit_one_character(&stem), trie);
        fan_out(swap_adjacent_characters(&stem), trie);
        fan_out(combinatorial_reorder(&stem), trie);
        fan_out(keyboard_substitution(&stem, KeyboardMap::Domain), trie);
        fan_out(insert_delimiter(&stem), trie);
    }

    Ok(())
}

/// Decodes a UTF-8 character at `i`; invalid sequences yield the
/// replacement character with width 1, matching flush-per-byte behavior.
fn decode_char(data: &[u8], i: usize) -> (char, usize) {
    let b = data[i];
    let width = match b {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return (char::REPLACEMENT_CHARACTER, 1),
    };
    if i + width > data.len() {
        return (char::REPLACEMENT_CHARACTER, 1);
    }
    match std::str::from_utf8(&data[i..i + width]) {
        Ok(text) => (
            text.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER),
            width,
        ),
        Err(_) => (char::REPLACEMENT_CHARACTER, 1),
    }
}

fn lowercase_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_lowercase()
}

/// Keeps newlines plus letters, numbers, punctuation, and currency/math
/// symbols (any script); everything else becomes one space so control
/// bytes cannot corrupt rendered context.
fn sanitize(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c == '\n'
                || c.is_alphanumeric()
                || c.is_punctuation()
                || c.is_symbol_currency()
                || c.is_symbol_math()
            {
                c
            } else {
                ' '
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(terms: &[&str], mode: MatchMode, class: CharacterClass) -> Search {
        let terms: Vec<String> = terms.iter().map(|s| (*s).to_owned()).collect();
        Search::new(&terms, Parameters::new(mode, class)).unwrap()
    }

    fn engine_with(
        terms: &[&str],
        params: Parameters,
    ) -> Search {
        let terms: Vec<String> = terms.iter().map(|s| (*s).to_owned()).collect();
        Search::new(&terms, params).unwrap()
    }

    #[test]
    fn exact_multi_term_in_encounter_order() {
        let search = engine(
            &["testing", "another"],
            MatchMode::Exact,
            CharacterClass::Package,
        );
        let results = search.matches(b"testing %! another").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].keyword.variation, "testing");
        assert_eq!(results[1].keyword.variation, "another");
        assert!(results[0].start_of_word < results[1].start_of_word);
    }

    #[test]
    fn normalization_folds_case() {
        let search = engine(
            &["Testing", "aNother"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Package,
        );
        let results = search.matches(b"tEsting %! anoTheR").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].keyword.variation, "testing");
        assert_eq!(results[0].keyword.original, "Testing");
        assert_eq!(results[0].matched_text, "tEsting");
        assert_eq!(results[1].keyword.variation, "another");
    }

    #[test]
    fn verbatim_term_matches_in_normalized_mode() {
        let search = engine(&["serde"], MatchMode::Normalized, CharacterClass::Package);
        let results = search.matches(b"uses serde for JSON").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "serde");
        assert_eq!(results[0].matched_text, "serde");
    }

    #[test]
    fn typo_variation_reports_original_and_variation() {
        let search = engine(
            &["word"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Package,
        );
        let results = search.matches(b"see wrod here").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "word");
        assert_eq!(results[0].keyword.variation, "wrod");
    }

    #[test]
    fn typo_only_filters_exact_hits() {
        let search = engine(&["abc-def"], MatchMode::TypoOnly, CharacterClass::Package);
        assert!(search.matches(b"abc-def").unwrap().is_empty());

        // Delimiter-normalized form of the term is still "exact".
        assert!(search.matches(b"abc_def").unwrap().is_empty());
    }

    #[test]
    fn typo_only_without_end_anchor_filters_prefix_hits() {
        let mut params = Parameters::new(MatchMode::TypoOnly, CharacterClass::Package);
        params.anchor_end = false;
        let search = engine_with(&["abcdef"], params);
        assert!(search.matches(b"abcdef").unwrap().is_empty());
    }

    #[test]
    fn typo_only_reports_real_typos() {
        let search = engine(&["abcdef"], MatchMode::TypoOnly, CharacterClass::Package);
        let results = search.matches(b"abcdf").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "abcdef");
        assert_eq!(results[0].keyword.variation, "abcdf");
    }

    #[test]
    fn line_numbers_and_offsets() {
        let search = engine(&["target"], MatchMode::Normalized, CharacterClass::Package);
        let results = search.matches(b"first line\nhas target here").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line_number, 2);
        assert_eq!(results[0].start_of_line, 11);
        assert_eq!(results[0].start_of_word, 15);
        assert_eq!(results[0].end_of_word, 21);
    }

    #[test]
    fn results_in_nondecreasing_offset_order() {
        let search = engine(
            &["aa", "bb"],
            MatchMode::Normalized,
            CharacterClass::Package,
        );
        let results = search.matches(b"bb aa bb aa").unwrap();
        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].start_of_word <= pair[1].start_of_word);
        }
    }

    #[test]
    fn duplicate_results_coalesce_per_word() {
        // "wrod" is both a swap of "word" and possibly other variations;
        // only one result per (line, word, original).
        let search = engine(
            &["word"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Package,
        );
        let results = search.matches(b"wrod").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn fail_on_invalid_errors_out() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.fail_on_invalid = true;
        let search = engine_with(&["abc"], params);
        assert!(matches!(
            search.matches(b"abc!def"),
            Err(SearchError::InvalidCharacter { ch: '!' })
        ));
    }

    #[test]
    fn permissive_scan_skips_bad_inputs() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.fail_on_invalid = true;
        let search = engine_with(&["abc"], params);
        let results = search.matches_permissive(&[&b"abc"[..], &b"a!c abc"[..], &b"abc"[..]]);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn domain_typo_with_tld_fanout() {
        let search = engine(&["foobar.com"], MatchMode::TypoOnly, CharacterClass::Domain);
        let results = search.matches(b"foo-bar.io").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "foobar.{com}");
        assert_eq!(results[0].keyword.variation, "foo-bar.io");

        // The exact input domain is filtered.
        assert!(search.matches(b"foobar.com").unwrap().is_empty());
        // Another TLD of the same stem is a typo.
        let other_tld = search.matches(b"foobar.net").unwrap();
        assert_eq!(other_tld.len(), 1);
        assert_eq!(other_tld[0].keyword.original, "foobar.{com}");
    }

    #[test]
    fn domain_multiple_tlds_share_stem() {
        let search = engine(
            &["foobar.com", "foobar.net"],
            MatchMode::TypoOnly,
            CharacterClass::Domain,
        );
        // Both input domains filter as exact.
        assert!(search.matches(b"foobar.com").unwrap().is_empty());
        assert!(search.matches(b"foobar.net").unwrap().is_empty());

        let results = search.matches(b"foobar.org").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "foobar.{com,net}");
    }

    #[test]
    fn domain_homoglyph_matches() {
        let search = engine(
            &["example.com"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Domain,
        );
        // Cyrillic 'а' in place of 'a'.
        let results = search.matches("exаmple.com".as_bytes()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "example.{com}");
    }

    #[test]
    fn domain_rejects_unknown_tld_and_subdomains() {
        let terms = vec!["foobar.notatld".to_owned()];
        assert!(matches!(
            Search::new(
                &terms,
                Parameters::new(MatchMode::TypoOnly, CharacterClass::Domain)
            ),
            Err(SearchError::InvalidTerm { .. })
        ));

        let terms = vec!["a.b.com".to_owned()];
        assert!(matches!(
            Search::new(
                &terms,
                Parameters::new(MatchMode::TypoOnly, CharacterClass::Domain)
            ),
            Err(SearchError::InvalidTerm { .. })
        ));
    }

    #[test]
    fn unanchored_beginning_matches_inside_words() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.anchor_beginning = false;
        params.anchor_end = false;
        let search = engine_with(&["core"], params);

        let results = search.matches(b"hardcorelib").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_of_match, 4);
        assert_eq!(results[0].end_of_match, 8);
        assert_eq!(results[0].start_of_word, 0);
        assert_eq!(results[0].end_of_word, 11);
    }

    #[test]
    fn anchored_ends_reject_partial_words() {
        let search = engine(&["core"], MatchMode::Normalized, CharacterClass::Package);
        assert!(search.matches(b"hardcorelib").unwrap().is_empty());
        assert!(search.matches(b"corelib").unwrap().is_empty());
        assert_eq!(search.matches(b"core lib").unwrap().len(), 1);
    }

    #[test]
    fn context_extraction_with_budget() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.include_context = true;
        params.context_columns = 2;
        let search = engine_with(&["secret"], params);

        let results = search.matches(b"aaa secret bbb\nnext").unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.context_before, "a ");
        assert!(result.trimmed_left);
        assert_eq!(result.context_after, " b");
        assert!(result.trimmed_right);
    }

    #[test]
    fn context_spans_requested_lines() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.include_context = true;
        params.context_columns = 40;
        params.lines_before = 1;
        params.lines_after = 1;
        let search = engine_with(&["needle"], params);

        let results = search
            .matches(b"line one\nbefore needle after\nline three\nline four")
            .unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.context_before, "line one\nbefore ");
        assert_eq!(result.context_after, " after\nline three");
        assert!(!result.trimmed_left);
        assert!(!result.trimmed_right);
    }

    #[test]
    fn context_sanitizes_control_bytes() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.include_context = true;
        params.context_columns = 10;
        let search = engine_with(&["key"], params);

        let results = search.matches(b"\x01\x02 key \x03\x04").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].context_before, "   ");
        assert_eq!(results[0].context_after, "   ");
    }

    #[test]
    fn context_keeps_unicode_punctuation_and_symbols() {
        let mut params = Parameters::new(MatchMode::Normalized, CharacterClass::Package);
        params.include_context = true;
        params.context_columns = 20;
        let search = engine_with(&["key"], params);

        let input = "—« key »≤€\x07".as_bytes();
        let results = search.matches(input).unwrap();
        assert_eq!(results.len(), 1);
        // Dashes, quotes, math, and currency survive; the control byte
        // becomes a space.
        assert_eq!(results[0].context_before, "—« ");
        assert_eq!(results[0].context_after, " »≤€ ");
    }

    #[test]
    fn repeated_delimiters_collapse_during_matching() {
        let search = engine(
            &["abc-def"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Package,
        );
        let results = search.matches(b"abc--def").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword.original, "abc-def");
    }

    #[test]
    fn stats_and_variations_exposed() {
        let search = engine(
            &["word"],
            MatchMode::NormalizedAndTypo,
            CharacterClass::Package,
        );
        let stats = search.stats();
        assert!(stats.variations > 10);
        assert!(stats.nodes > 10);

        let variations = search.variations();
        assert!(variations.contains(&"wrod".to_owned()));
        assert!(variations.contains(&"word".to_owned()));
    }
}

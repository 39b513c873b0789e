//! Typo variation generators.
//!
//! Partly modeled on the techniques cataloged in "SpellBound: Defending
//! Against Package Typosquatting". Each generator dedups against the
//! source string and its own earlier output, preserving first-emission
//! order.

use crate::stdx::KeySet;

use super::charset::CharsetConfig;
use super::params::CharacterClass;
use super::result::SearchError;

/// Keyboard/homoglyph substitution tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyboardMap {
    /// QWERTY adjacency plus ASCII visual confusables.
    Qwerty,
    /// `Qwerty` extended with IDN homoglyphs allowed in domain labels.
    Domain,
}

impl KeyboardMap {
    /// Substitutions for one byte, in fixed order.
    fn substitutions(self, b: u8) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = qwerty_neighbors(b).to_vec();
        if self == Self::Domain {
            out.extend_from_slice(idn_homoglyphs(b));
        }
        out
    }
}

/// Lowercases and, for the Package class, folds `_`/`.` into `-` and
/// collapses `-` runs.
///
/// # Errors
/// Fails when the term contains characters outside the class.
pub fn normalize(term: &str, config: &CharsetConfig) -> Result<String, SearchError> {
    if let Some(bad) = term.chars().find(|&c| !config.is_valid_char(c)) {
        return Err(SearchError::InvalidTerm {
            term: term.to_owned(),
            detail: format!("character '{bad}' outside character class"),
        });
    }

    let mut lowered = term.to_lowercase();

    if config.class == CharacterClass::Package {
        lowered = lowered.replace(['_', '.'], "-");

        let mut folded = String::with_capacity(lowered.len());
        let mut last = '\0';
        for c in lowered.chars() {
            if c == '-' && last == '-' {
                continue;
            }
            folded.push(c);
            last = c;
        }
        lowered = folded;
    }

    Ok(lowered)
}

/// Omits one character per position: `abc` → `bc`, `ac`, `ab`.
#[must_use]
pub fn omit_one_character(term: &str) -> Vec<String> {
    let mut seen: KeySet<String> = KeySet::new();
    let mut out = Vec::new();

    for (i, c) in term.char_indices() {
        let mut candidate = String::with_capacity(term.len());
        candidate.push_str(&term[..i]);
        candidate.push_str(&term[i + c.len_utf8()..]);
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

/// Duplicates one character per position, skipping the `-` delimiter:
/// `ab` → `aab`, `abb`.
#[must_use]
pub fn duplicate_one_character(term: &str) -> Vec<String> {
    let mut seen: KeySet<String> = KeySet::new();
    seen.insert(term.to_owned());
    let mut out = Vec::new();

    for (i, c) in term.char_indices() {
        if c == '-' {
            continue;
        }
        let mut candidate = String::with_capacity(term.len() + c.len_utf8());
        candidate.push_str(&term[..i]);
        candidate.push(c);
        candidate.push_str(&term[i..]);
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

/// Swaps each adjacent character pair: `abc` → `bac`, `acb`.
#[must_use]
pub fn swap_adjacent_characters(term: &str) -> Vec<String> {
    let mut seen: KeySet<String> = KeySet::new();
    seen.insert(term.to_owned());
    let mut out = Vec::new();

    let chars: Vec<char> = term.chars().collect();
    for i in 0..chars.len().saturating_sub(1) {
        let mut swapped = chars.clone();
        swapped.swap(i, i + 1);
        let candidate: String = swapped.into_iter().collect();
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

/// Maximum `-`-delimited parts for combinatorial reorder; beyond this the
/// fan-out is skipped entirely.
const MAX_REORDER_PARTS: usize = 5;

/// Reorders `-`-delimited parts combinatorially:
/// `a-b-c` → every other ordering of `a`, `b`, `c`.
///
/// The part cap counts non-empty parts, but reordering runs over the raw
/// split, so empty parts from leading/trailing/doubled delimiters move
/// with the rest (`-abc` → `abc-`).
#[must_use]
pub fn combinatorial_reorder(term: &str) -> Vec<String> {
    let parts: Vec<&str> = term.split('-').collect();

    let element_count = parts.iter().filter(|p| !p.is_empty()).count();
    if element_count > MAX_REORDER_PARTS {
        tracing::debug!(word = term, "skipping combinatorial reorder");
        return Vec::new();
    }

    let mut seen: KeySet<String> = KeySet::new();
    seen.insert(term.to_owned());
    let mut out = Vec::new();

    for combination in orderings(&parts) {
        if seen.insert(combination.clone()) {
            out.push(combination);
        }
    }
    out
}

fn orderings(parts: &[&str]) -> Vec<String> {
    match parts.len() {
        0 | 1 => Vec::new(),
        2 => vec![
            format!("{}-{}", parts[0], parts[1]),
            format!("{}-{}", parts[1], parts[0]),
        ],
        _ => {
            let mut out = Vec::new();
            for (i, head) in parts.iter().enumerate() {
                let rest: Vec<&str> = parts
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, p)| *p)
                    .collect();
                for tail in orderings(&rest) {
                    out.push(format!("{head}-{tail}"));
                }
            }
            out
        }
    }
}

/// Inserts a `-` between each pair of adjacent non-delimiter characters:
/// `abc` → `a-bc`, `ab-c`.
#[must_use]
pub fn insert_delimiter(term: &str) -> Vec<String> {
    let mut seen: KeySet<String> = KeySet::new();
    seen.insert(term.to_owned());
    let mut out = Vec::new();

    let bytes = term.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if !term.is_char_boundary(i + 1) {
            continue;
        }
        if bytes[i] != b'-' && bytes[i + 1] != b'-' {
            let candidate = format!("{}-{}", &term[..i + 1], &term[i + 1..]);
            if seen.insert(candidate.clone()) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Substitutes each position with its keyboard neighbors and visual
/// confusables. No dedup: ordering follows position then table order.
#[must_use]
pub fn keyboard_substitution(term: &str, map: KeyboardMap) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = term.as_bytes();

    for i in 0..bytes.len() {
        if !term.is_char_boundary(i) || !term.is_char_boundary(i + 1) {
            continue;
        }
        for substitution in map.substitutions(bytes[i]) {
            out.push(format!("{}{}{}", &term[..i], substitution, &term[i + 1..]));
        }
    }
    out
}

/// QWERTY adjacency plus ASCII visual confusables, per byte.
fn qwerty_neighbors(b: u8) -> &'static [&'static str] {
    match b {
        b'q' => &["1", "2", "w", "s", "a"],
        b'w' => &["q", "3", "e", "d", "s", "a"],
        // e is also sometimes replaced by 3
        b'e' => &["w", "3", "4", "r", "d", "s"],
        b'r' => &["e", "4", "5", "t", "f", "d"],
        // t is sometimes replaced by 7
        b't' => &["r", "5", "6", "y", "g", "f", "7"],
        b'y' => &["t", "6", "7", "u", "h", "g"],
        b'u' => &["y", "7", "8", "i", "j", "h"],
        // i is visually similar to 1, l
        b'i' => &["u", "8", "9", "o", "k", "j", "1", "l"],
        // o is also visually similar to 0
        b'o' => &["i", "9", "0", "p", "l", "k"],
        b'p' => &["o", "0", "-", "l"],
        // a is sometimes replaced by 4
        b'a' => &["q", "w", "s", "z", "4"],
        // s is sometimes replaced by 5
        b's' => &["a", "q", "w", "e", "d", "x", "z", "5"],
        b'd' => &["s", "w", "e", "r", "f", "c", "x"],
        b'f' => &["d", "e", "r", "t", "g", "v", "c"],
        // g is sometimes replaced by 6
        b'g' => &["f", "r", "t", "y", "h", "v", "b", "6"],
        b'h' => &["g", "t", "y", "u", "j", "n", "b"],
        b'j' => &["h", "y", "u", "i", "k", "m", "n"],
        b'k' => &["j", "u", "i", "o", "l", "m"],
        // l is visually similar to 1, i
        b'l' => &["k", "i", "o", "p", ".", "1", "i"],
        // z is sometimes replaced by 2
        b'z' => &["a", "s", "x", "2"],
        b'x' => &["z", "s", "d", "c"],
        b'c' => &["x", "d", "f", "v"],
        b'v' => &["c", "f", "g", "b"],
        // b is sometimes replaced by 8
        b'b' => &["v", "g", "h", "n", "8"],
        b'n' => &["b", "h", "j", "m"],
        b'm' => &["n", "j", "k"],
        b'1' => &["2", "q", "l", "i"],
        b'2' => &["1", "3", "w", "q"],
        b'3' => &["2", "4", "e", "w"],
        b'4' => &["3", "5", "r", "e"],
        b'5' => &["4", "6", "t", "r", "s", "s"],
        b'6' => &["5", "7", "y", "t"],
        b'7' => &["6", "8", "u", "y"],
        b'8' => &["7", "9", "i", "u"],
        b'9' => &["8", "0", "o", "i"],
        b'0' => &["9", "-", "p", "o"],
        _ => &[],
    }
}

/// IDN homoglyphs allowed in domain labels; an incomplete but useful
/// subset of the confusables catalogued for IDN homograph attacks
/// (RFC 5892 permits far more).
fn idn_homoglyphs(b: u8) -> &'static [&'static str] {
    match b {
        b'a' => &["а", "ą"],
        b'c' => &["с"],
        b'd' => &["ԁ"],
        b'e' => &["е"],
        b'g' => &["ց", "ǥ"],
        b'h' => &["һ"],
        b'i' => &["і", "Ӏ", "ì", "í", "ĭ", "į"],
        b'j' => &["ј", "ĵ"],
        b'k' => &["κ", "ķ", "ĸ"],
        b'l' => &["ľ"],
        b'n' => &["ո", "ŋ", "ņ"],
        b'o' => &["о", "ο", "օ"],
        b'p' => &["р"],
        b'q' => &["ԛ"],
        b'r' => &["ŗ"],
        b's' => &["ѕ", "ş"],
        b't' => &["τ", "ţ", "ť"],
        b'u' => &["υ", "ս"],
        b'v' => &["ѵ", "ν", "γ"],
        b'w' => &["ԝ"],
        b'x' => &["х", "χ"],
        b'y' => &["у", "γ"],
        b'1' => &["ı"],
        b'2' => &["շ"],
        b'3' => &["З"],
        b'4' => &["Ч"],
        b'6' => &["б"],
        _ => &[],
    }
}

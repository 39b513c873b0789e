//! Canonical serialization of decoded objects.
//!
//! Re-serializes decoded objects to the exact byte form Git hashes. Two
//! consumers rely on byte-exactness: fixture construction (an encoded
//! object must decode back to itself) and signature verification (the
//! signing payload is the serialization without the signature block).
//!
//! The re-hasher does *not* use these functions for child references — it
//! recomputes child digests under its own algorithm — but it shares the
//! line-formatting helpers here so the two serializations cannot drift.

use std::fmt::Write as _;

use super::object::{AnnotatedTag, Commit, Person, Tree};
use super::object_id::ObjectId;
use super::ObjectKind;

/// Rejected signature text during folding.
///
/// The canonical `gpgsig` form requires a newline-terminated signature;
/// anything else cannot be folded reversibly.
#[derive(Debug)]
pub struct MalformedSignature {
    pub last_line: String,
}

impl std::fmt::Display for MalformedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expected empty last line of signature, got '{}'",
            self.last_line
        )
    }
}

impl std::error::Error for MalformedSignature {}

/// Prepends the `"<type> <len>\0"` framing header to a payload.
#[must_use]
pub fn frame(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(payload);
    out
}

/// Writes `"<label> Name <email> ts tz\n"`.
pub fn push_person_line(out: &mut String, label: &str, person: &Person) {
    let _ = writeln!(out, "{label} {person}");
}

/// Folds a signature into a `gpgsig` block: the header word, the first
/// line, then each continuation line prefixed with a single space. Exactly
/// the lines of the signature are emitted; the caller supplies the blank
/// separator line that follows.
///
/// # Errors
/// Fails if the signature's last line is not empty (i.e. the text is not
/// newline-terminated).
pub fn push_folded_signature(out: &mut String, signature: &str) -> Result<(), MalformedSignature> {
    out.push_str("gpgsig");

    let parts: Vec<&str> = signature.split('\n').collect();
    for part in &parts[..parts.len() - 1] {
        out.push(' ');
        out.push_str(part);
        out.push('\n');
    }

    let last = parts[parts.len() - 1];
    if !last.is_empty() {
        return Err(MalformedSignature {
            last_line: last.to_owned(),
        });
    }

    Ok(())
}

/// Canonical commit payload (the bytes Git frames and hashes).
///
/// # Errors
/// Fails only on a malformed signature block.
pub fn encode_commit(commit: &Commit) -> Result<Vec<u8>, MalformedSignature> {
    let mut out = String::new();
    let _ = writeln!(out, "tree {}", commit.tree);
    for parent in &commit.parents {
        let _ = writeln!(out, "parent {parent}");
    }
    push_person_line(&mut out, "author", &commit.author);
    push_person_line(&mut out, "committer", &commit.committer);

    if let Some(signature) = &commit.signature {
        push_folded_signature(&mut out, signature)?;
    }

    out.push('\n');
    out.push_str(&commit.message);
    Ok(out.into_bytes())
}

/// Commit serialization without the signature block — the payload an SSH
/// or PGP signature is computed over.
#[must_use]
pub fn commit_signing_payload(commit: &Commit) -> Vec<u8> {
    let mut out = String::new();
    let _ = writeln!(out, "tree {}", commit.tree);
    for parent in &commit.parents {
        let _ = writeln!(out, "parent {parent}");
    }
    push_person_line(&mut out, "author", &commit.author);
    push_person_line(&mut out, "committer", &commit.committer);
    out.push('\n');
    out.push_str(&commit.message);
    out.into_bytes()
}

/// Canonical tree payload: `mode SP name NUL raw-id` per entry, stored order.
#[must_use]
pub fn encode_tree(tree: &Tree) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in &tree.entries {
        out.extend_from_slice(entry.mode.octal_text().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_slice());
    }
    out
}

/// Canonical annotated-tag payload. A signature, if present, is appended
/// verbatim after the message (no folding, no separator).
#[must_use]
pub fn encode_tag(tag: &AnnotatedTag) -> Vec<u8> {
    let mut out = tag_signing_payload(tag);
    if let Some(signature) = &tag.signature {
        out.extend_from_slice(signature.as_bytes());
    }
    out
}

/// Tag serialization without the trailing signature.
#[must_use]
pub fn tag_signing_payload(tag: &AnnotatedTag) -> Vec<u8> {
    let mut out = String::new();
    let _ = writeln!(out, "object {}", tag.target);
    let _ = writeln!(out, "type {}", tag.target_kind);
    let _ = writeln!(out, "tag {}", tag.name);
    push_person_line(&mut out, "tagger", &tag.tagger);
    out.push('\n');
    out.push_str(&tag.message);
    out.into_bytes()
}

/// Writes the same payload with a specific rendered id per reference.
///
/// Used by the re-hasher, which substitutes recomputed child digests while
/// keeping the surrounding line structure identical to [`encode_commit`].
pub fn push_id_line(out: &mut String, label: &str, id: &ObjectId) {
    let _ = writeln!(out, "{label} {id}");
}

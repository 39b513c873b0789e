//! Decoders for raw Git object payloads.
//!
//! Input is the object payload after loose/pack decoding, without the
//! `"<type> <len>\0"` framing header. Decoding is strict: anything the
//! object model cannot represent byte-exactly is rejected, because the
//! verifier's SHA-1 self-check depends on decoded objects re-serializing
//! to the identical payload.
//!
//! # Commit Object Format
//! ```text
//! tree <hex-oid>\n
//! parent <hex-oid>\n        (zero or more)
//! author <name> <email> <timestamp> <tz>\n
//! committer <name> <email> <timestamp> <tz>\n
//! gpgsig <first line>\n     (optional; continuation lines prefixed by SP)
//! \n
//! <message>
//! ```
//!
//! # Parsing Assumptions
//! - Headers appear in the standard order shown above.
//! - The `gpgsig` block is unfolded by stripping one leading space per
//!   continuation line; the stored signature is newline-terminated.
//! - Headers other than the ones modeled here are treated as corrupt:
//!   accepting them would break byte-exact re-serialization.

use std::fmt;

use memchr::memchr;

use super::object::{
    AnnotatedTag, Blob, Commit, EntryMode, GitObject, ObjectKind, Person, Tree, TreeEntry,
};
use super::object_id::{DigestKind, ObjectId};

/// Errors from object payload decoding.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// Payload is corrupt or uses an unsupported layout.
    Corrupt { kind: ObjectKind, detail: &'static str },
    /// Invalid hex character in an object reference.
    InvalidHex { byte: u8 },
    /// Tree entry mode is not a known Git mode.
    UnknownMode { mode: u32 },
    /// A text field is not valid UTF-8.
    InvalidUtf8 { what: &'static str },
}

impl DecodeError {
    #[inline]
    const fn corrupt(kind: ObjectKind, detail: &'static str) -> Self {
        Self::Corrupt { kind, detail }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { kind, detail } => write!(f, "corrupt {kind} object: {detail}"),
            Self::InvalidHex { byte } => write!(f, "invalid hex byte in object id: 0x{byte:02x}"),
            Self::UnknownMode { mode } => write!(f, "unknown tree entry mode: {mode:o}"),
            Self::InvalidUtf8 { what } => write!(f, "{what} is not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a payload by its type tag into the object union.
pub fn decode_object(
    kind: ObjectKind,
    data: &[u8],
    format: DigestKind,
) -> Result<GitObject, DecodeError> {
    Ok(match kind {
        ObjectKind::Blob => GitObject::Blob(decode_blob(data)),
        ObjectKind::Tree => GitObject::Tree(decode_tree(data, format)?),
        ObjectKind::Commit => GitObject::Commit(decode_commit(data, format)?),
        ObjectKind::Tag => GitObject::Tag(decode_tag(data, format)?),
    })
}

/// Decodes a blob payload.
#[must_use]
pub fn decode_blob(data: &[u8]) -> Blob {
    Blob {
        data: data.to_vec(),
    }
}

/// Decodes a tree payload: a run of `mode SP name NUL raw-id` entries.
///
/// # Errors
/// Fails on truncated entries, NUL-free names, non-UTF-8 names, and modes
/// outside the known Git set.
pub fn decode_tree(data: &[u8], format: DigestKind) -> Result<Tree, DecodeError> {
    let id_len = format.digest_len();
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let space = memchr(b' ', &data[pos..])
            .ok_or(DecodeError::corrupt(ObjectKind::Tree, "entry missing space"))?;
        let mode = parse_octal(&data[pos..pos + space])?;
        let mode = EntryMode::from_octal(mode).ok_or(DecodeError::UnknownMode { mode })?;
        pos += space + 1;

        let nul = memchr(0, &data[pos..])
            .ok_or(DecodeError::corrupt(ObjectKind::Tree, "entry missing NUL"))?;
        let name = std::str::from_utf8(&data[pos..pos + nul])
            .map_err(|_| DecodeError::InvalidUtf8 { what: "tree entry name" })?
            .to_owned();
        pos += nul + 1;

        if data.len() < pos + id_len {
            return Err(DecodeError::corrupt(ObjectKind::Tree, "truncated entry id"));
        }
        let id = ObjectId::from_digest(&data[pos..pos + id_len])
            .ok_or(DecodeError::corrupt(ObjectKind::Tree, "bad entry id length"))?;
        pos += id_len;

        entries.push(TreeEntry { mode, name, id });
    }

    Ok(Tree { entries })
}

/// Decodes a commit payload.
///
/// # Errors
/// Fails on missing or out-of-order headers, malformed person stamps,
/// unmodeled headers, and non-UTF-8 text.
pub fn decode_commit(data: &[u8], format: DigestKind) -> Result<Commit, DecodeError> {
    let kind = ObjectKind::Commit;
    let mut pos = 0;

    let tree = parse_id_line(data, &mut pos, b"tree ", format, kind)?;

    let mut parents = Vec::new();
    while data[pos..].starts_with(b"parent ") {
        parents.push(parse_id_line(data, &mut pos, b"parent ", format, kind)?);
    }

    let author = parse_person_line(data, &mut pos, b"author ", kind)?;
    let committer = parse_person_line(data, &mut pos, b"committer ", kind)?;

    let mut signature = None;
    if data[pos..].starts_with(b"gpgsig ") {
        pos += b"gpgsig ".len();
        signature = Some(parse_folded_block(data, &mut pos, kind)?);
    }

    if !data[pos..].starts_with(b"\n") {
        return Err(DecodeError::corrupt(kind, "missing blank line before message"));
    }
    pos += 1;

    let message = std::str::from_utf8(&data[pos..])
        .map_err(|_| DecodeError::InvalidUtf8 { what: "commit message" })?
        .to_owned();

    Ok(Commit {
        tree,
        parents,
        author,
        committer,
        signature,
        message,
    })
}

/// Decodes an annotated tag payload.
///
/// The message and a trailing armored signature are split apart so that
/// signing-payload reconstruction (message without signature) is possible;
/// concatenating them reproduces the original body byte-for-byte.
///
/// # Errors
/// Fails on missing headers, an unknown target type, or non-UTF-8 text.
pub fn decode_tag(data: &[u8], format: DigestKind) -> Result<AnnotatedTag, DecodeError> {
    let kind = ObjectKind::Tag;
    let mut pos = 0;

    let target = parse_id_line(data, &mut pos, b"object ", format, kind)?;

    let type_line = parse_text_line(data, &mut pos, b"type ", kind)?;
    let target_kind = ObjectKind::parse(&type_line)
        .ok_or(DecodeError::corrupt(kind, "unknown target type"))?;

    let name = parse_text_line(data, &mut pos, b"tag ", kind)?;
    let tagger = parse_person_line(data, &mut pos, b"tagger ", kind)?;

    if !data[pos..].starts_with(b"\n") {
        return Err(DecodeError::corrupt(kind, "missing blank line before message"));
    }
    pos += 1;

    let body = std::str::from_utf8(&data[pos..])
        .map_err(|_| DecodeError::InvalidUtf8 { what: "tag message" })?;

    let (message, signature) = split_tag_signature(body);

    Ok(AnnotatedTag {
        target,
        target_kind,
        name,
        tagger,
        signature,
        message,
    })
}

/// Splits a trailing armored signature off a tag body.
fn split_tag_signature(body: &str) -> (String, Option<String>) {
    for marker in ["-----BEGIN PGP SIGNATURE-----", "-----BEGIN SSH SIGNATURE-----"] {
        if let Some(at) = body.find(marker) {
            // The signature must start at the beginning of a line.
            if at == 0 || body.as_bytes()[at - 1] == b'\n' {
                return (body[..at].to_owned(), Some(body[at..].to_owned()));
            }
        }
    }
    (body.to_owned(), None)
}

/// Parses a `<prefix><hex-id>\n` header line.
fn parse_id_line(
    data: &[u8],
    pos: &mut usize,
    prefix: &[u8],
    format: DigestKind,
    kind: ObjectKind,
) -> Result<ObjectId, DecodeError> {
    if !data[*pos..].starts_with(prefix) {
        return Err(DecodeError::corrupt(kind, "missing expected id header"));
    }
    *pos += prefix.len();

    let hex_len = format.hex_len();
    if data.len() < *pos + hex_len + 1 {
        return Err(DecodeError::corrupt(kind, "id header too short"));
    }

    let hex = &data[*pos..*pos + hex_len];
    if let Some(&bad) = hex.iter().find(|b| !b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex { byte: bad });
    }
    let text = std::str::from_utf8(hex).expect("hex digits are ASCII");
    let id = ObjectId::from_hex(text).ok_or(DecodeError::corrupt(kind, "bad id header"))?;
    *pos += hex_len;

    if data[*pos] != b'\n' {
        return Err(DecodeError::corrupt(kind, "id header missing newline"));
    }
    *pos += 1;

    Ok(id)
}

/// Parses a `<prefix><text>\n` header line, returning the text.
fn parse_text_line(
    data: &[u8],
    pos: &mut usize,
    prefix: &[u8],
    kind: ObjectKind,
) -> Result<String, DecodeError> {
    if !data[*pos..].starts_with(prefix) {
        return Err(DecodeError::corrupt(kind, "missing expected header"));
    }
    *pos += prefix.len();

    let newline = memchr(b'\n', &data[*pos..])
        .ok_or(DecodeError::corrupt(kind, "header missing newline"))?;
    let text = std::str::from_utf8(&data[*pos..*pos + newline])
        .map_err(|_| DecodeError::InvalidUtf8 { what: "header text" })?
        .to_owned();
    *pos += newline + 1;

    Ok(text)
}

/// Parses a `<prefix><name> <<email>> <timestamp> <tz>\n` stamp line.
fn parse_person_line(
    data: &[u8],
    pos: &mut usize,
    prefix: &[u8],
    kind: ObjectKind,
) -> Result<Person, DecodeError> {
    let line = parse_text_line(data, pos, prefix, kind)?;

    let open = line
        .find('<')
        .ok_or(DecodeError::corrupt(kind, "person stamp missing '<'"))?;
    let close = line[open..]
        .find('>')
        .map(|i| open + i)
        .ok_or(DecodeError::corrupt(kind, "person stamp missing '>'"))?;

    let name = line[..open].trim_end().to_owned();
    let email = line[open + 1..close].to_owned();

    let rest = line[close + 1..].trim_start();
    let mut fields = rest.split(' ');
    let timestamp = fields
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or(DecodeError::corrupt(kind, "person stamp missing timestamp"))?;
    let tz = fields
        .next()
        .ok_or(DecodeError::corrupt(kind, "person stamp missing timezone"))?
        .to_owned();
    if fields.next().is_some() {
        return Err(DecodeError::corrupt(kind, "person stamp has trailing fields"));
    }

    Ok(Person {
        name,
        email,
        timestamp,
        tz,
    })
}

/// Unfolds a space-continued header block (the `gpgsig` signature).
///
/// The returned string joins the first line and each continuation line with
/// `\n` and is newline-terminated, matching the signature text as written
/// by `git commit -S`.
fn parse_folded_block(
    data: &[u8],
    pos: &mut usize,
    kind: ObjectKind,
) -> Result<String, DecodeError> {
    let mut out = String::new();

    loop {
        let newline = memchr(b'\n', &data[*pos..])
            .ok_or(DecodeError::corrupt(kind, "folded header missing newline"))?;
        let line = std::str::from_utf8(&data[*pos..*pos + newline])
            .map_err(|_| DecodeError::InvalidUtf8 { what: "commit signature" })?;
        out.push_str(line);
        out.push('\n');
        *pos += newline + 1;

        if data[*pos..].starts_with(b" ") {
            *pos += 1; // continuation marker
        } else {
            break;
        }
    }

    Ok(out)
}

fn parse_octal(text: &[u8]) -> Result<u32, DecodeError> {
    if text.is_empty() {
        return Err(DecodeError::corrupt(ObjectKind::Tree, "empty entry mode"));
    }
    let mut value: u32 = 0;
    for &b in text {
        if !(b'0'..=b'7').contains(&b) {
            return Err(DecodeError::corrupt(ObjectKind::Tree, "non-octal entry mode"));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u32::from(b - b'0')))
            .ok_or(DecodeError::corrupt(ObjectKind::Tree, "entry mode overflow"))?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_HEX: &str = "1234567890abcdef1234567890abcdef12345678";
    const PARENT_HEX: &str = "abcdef1234567890abcdef1234567890abcdef12";

    fn plain_commit(parents: &[&str], message: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("tree {TREE_HEX}\n").as_bytes());
        for parent in parents {
            out.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        out.extend_from_slice(b"author Alice <a@x> 1700000000 +0000\n");
        out.extend_from_slice(b"committer Bob <b@x> 1700000001 -0500\n");
        out.push(b'\n');
        out.extend_from_slice(message.as_bytes());
        out
    }

    #[test]
    fn commit_without_parents() {
        let commit = decode_commit(&plain_commit(&[], "hi\n"), DigestKind::Sha1).unwrap();
        assert_eq!(commit.tree, ObjectId::from_hex(TREE_HEX).unwrap());
        assert!(commit.parents.is_empty());
        assert_eq!(commit.author.name, "Alice");
        assert_eq!(commit.author.email, "a@x");
        assert_eq!(commit.committer.timestamp, 1_700_000_001);
        assert_eq!(commit.committer.tz, "-0500");
        assert!(commit.signature.is_none());
        assert_eq!(commit.message, "hi\n");
    }

    #[test]
    fn commit_with_parents() {
        let second = "fedcba0987654321fedcba0987654321fedcba09";
        let commit =
            decode_commit(&plain_commit(&[PARENT_HEX, second], "m"), DigestKind::Sha1).unwrap();
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.parents[0], ObjectId::from_hex(PARENT_HEX).unwrap());
        assert_eq!(commit.parents[1], ObjectId::from_hex(second).unwrap());
    }

    #[test]
    fn commit_with_gpgsig_unfolds() {
        let mut data = Vec::new();
        data.extend_from_slice(format!("tree {TREE_HEX}\n").as_bytes());
        data.extend_from_slice(b"author A <a@b> 1700000000 +0000\n");
        data.extend_from_slice(b"committer C <c@d> 1700000004 +0000\n");
        data.extend_from_slice(b"gpgsig -----BEGIN PGP SIGNATURE-----\n");
        data.extend_from_slice(b" \n");
        data.extend_from_slice(b" iQEzBAABCAAdFiEE\n");
        data.extend_from_slice(b" -----END PGP SIGNATURE-----\n");
        data.push(b'\n');
        data.extend_from_slice(b"signed\n");

        let commit = decode_commit(&data, DigestKind::Sha1).unwrap();
        assert_eq!(
            commit.signature.as_deref(),
            Some("-----BEGIN PGP SIGNATURE-----\n\niQEzBAABCAAdFiEE\n-----END PGP SIGNATURE-----\n")
        );
        assert_eq!(commit.message, "signed\n");
    }

    #[test]
    fn commit_rejects_unknown_header() {
        let mut data = Vec::new();
        data.extend_from_slice(format!("tree {TREE_HEX}\n").as_bytes());
        data.extend_from_slice(b"author A <a@b> 1700000000 +0000\n");
        data.extend_from_slice(b"committer C <c@d> 1700000004 +0000\n");
        data.extend_from_slice(b"encoding ISO-8859-1\n");
        data.push(b'\n');
        data.extend_from_slice(b"msg\n");

        assert!(matches!(
            decode_commit(&data, DigestKind::Sha1),
            Err(DecodeError::Corrupt { .. })
        ));
    }

    #[test]
    fn commit_rejects_bad_hex() {
        let mut data = plain_commit(&[], "m");
        data[5] = b'Z';
        assert!(matches!(
            decode_commit(&data, DigestKind::Sha1),
            Err(DecodeError::InvalidHex { byte: b'Z' })
        ));
    }

    #[test]
    fn tree_entries_decode_in_order() {
        let blob_id = ObjectId::sha1([0x11; 20]);
        let tree_id = ObjectId::sha1([0x22; 20]);

        let mut data = Vec::new();
        data.extend_from_slice(b"100644 a.txt\0");
        data.extend_from_slice(blob_id.as_slice());
        data.extend_from_slice(b"40000 dir\0");
        data.extend_from_slice(tree_id.as_slice());

        let tree = decode_tree(&data, DigestKind::Sha1).unwrap();
        assert_eq!(tree.entries.len(), 2);
        assert_eq!(tree.entries[0].mode, EntryMode::Regular);
        assert_eq!(tree.entries[0].name, "a.txt");
        assert_eq!(tree.entries[0].id, blob_id);
        assert_eq!(tree.entries[1].mode, EntryMode::Dir);
        assert_eq!(tree.entries[1].id, tree_id);
    }

    #[test]
    fn tree_accepts_gitlink_but_rejects_unknown_mode() {
        let mut data = Vec::new();
        data.extend_from_slice(b"160000 sub\0");
        data.extend_from_slice(&[0x33; 20]);
        let tree = decode_tree(&data, DigestKind::Sha1).unwrap();
        assert_eq!(tree.entries[0].mode, EntryMode::Submodule);

        let mut data = Vec::new();
        data.extend_from_slice(b"100600 odd\0");
        data.extend_from_slice(&[0x33; 20]);
        assert!(matches!(
            decode_tree(&data, DigestKind::Sha1),
            Err(DecodeError::UnknownMode { mode: 0o100600 })
        ));
    }

    #[test]
    fn tree_rejects_truncation() {
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 f\0");
        data.extend_from_slice(&[0x44; 10]); // half an id
        assert!(decode_tree(&data, DigestKind::Sha1).is_err());
    }

    #[test]
    fn tag_roundtrip() {
        let mut data = Vec::new();
        data.extend_from_slice(format!("object {PARENT_HEX}\n").as_bytes());
        data.extend_from_slice(b"type commit\n");
        data.extend_from_slice(b"tag v1.0.0\n");
        data.extend_from_slice(b"tagger T <t@x> 1700000000 +0100\n");
        data.push(b'\n');
        data.extend_from_slice(b"release\n");

        let tag = decode_tag(&data, DigestKind::Sha1).unwrap();
        assert_eq!(tag.target, ObjectId::from_hex(PARENT_HEX).unwrap());
        assert_eq!(tag.target_kind, ObjectKind::Commit);
        assert_eq!(tag.name, "v1.0.0");
        assert_eq!(tag.tagger.email, "t@x");
        assert_eq!(tag.message, "release\n");
        assert!(tag.signature.is_none());
    }

    #[test]
    fn tag_splits_trailing_signature() {
        let sig = "-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n";
        let mut data = Vec::new();
        data.extend_from_slice(format!("object {PARENT_HEX}\n").as_bytes());
        data.extend_from_slice(b"type commit\n");
        data.extend_from_slice(b"tag v2\n");
        data.extend_from_slice(b"tagger T <t@x> 1700000000 +0100\n");
        data.push(b'\n');
        data.extend_from_slice(b"release\n");
        data.extend_from_slice(sig.as_bytes());

        let tag = decode_tag(&data, DigestKind::Sha1).unwrap();
        assert_eq!(tag.message, "release\n");
        assert_eq!(tag.signature.as_deref(), Some(sig));
    }

    #[test]
    fn person_with_spaces_in_name() {
        let mut data = Vec::new();
        data.extend_from_slice(format!("tree {TREE_HEX}\n").as_bytes());
        data.extend_from_slice(b"author Mary Jane Watson <mj@x.org> 1700000000 +0000\n");
        data.extend_from_slice(b"committer C <c@d> 1700000004 +0000\n");
        data.push(b'\n');

        let commit = decode_commit(&data, DigestKind::Sha1).unwrap();
        assert_eq!(commit.author.name, "Mary Jane Watson");
        assert_eq!(commit.author.email, "mj@x.org");
    }
}

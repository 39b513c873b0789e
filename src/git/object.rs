//! Decoded Git object model.
//!
//! Ownership of decoded objects rests with [`crate::git::RepoState`]; every
//! other component refers to objects by [`ObjectId`]. The variants form a
//! closed tagged union — consumers match on [`GitObject`] rather than using
//! dynamic dispatch.

use std::fmt;

use super::object_id::ObjectId;

/// The four Git object types.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    /// Canonical lowercase type name as it appears in object framing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses a type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tree entry mode.
///
/// The discriminants are the Git on-disk octal values.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    Dir = 0o040000,
    Regular = 0o100644,
    /// Group-writable regular file; produced by ancient Git versions and
    /// still present in old histories.
    Deprecated = 0o100664,
    Executable = 0o100755,
    Symlink = 0o120000,
    /// Gitlink (submodule) entry. Decodable, but outside the set the
    /// re-hasher supports.
    Submodule = 0o160000,
}

impl EntryMode {
    /// Maps an octal mode value to a known mode.
    #[must_use]
    pub fn from_octal(mode: u32) -> Option<Self> {
        match mode {
            0o040000 => Some(Self::Dir),
            0o100644 => Some(Self::Regular),
            0o100664 => Some(Self::Deprecated),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Submodule),
            _ => None,
        }
    }

    /// Octal text without leading zeros, as serialized in tree payloads.
    #[must_use]
    pub const fn octal_text(self) -> &'static str {
        match self {
            Self::Dir => "40000",
            Self::Regular => "100644",
            Self::Deprecated => "100664",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Submodule => "160000",
        }
    }

    /// True for entries that reference a subtree.
    #[inline]
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::Dir)
    }

    /// True for entries whose target is file content (a blob).
    #[inline]
    #[must_use]
    pub const fn is_file(self) -> bool {
        matches!(self, Self::Regular | Self::Deprecated | Self::Executable)
    }
}

/// One `(mode, name, child)` row of a tree.
///
/// Entries keep their stored order: Git sorts them by name, with trees
/// sorting as if their name had a trailing `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub id: ObjectId,
}

/// A tree: an ordered sequence of entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

/// A blob: raw byte payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

/// Author/committer/tagger stamp.
///
/// `tz` keeps the raw `±HHMM` text so re-serialization is byte-exact even
/// for offsets that do not normalize (e.g. `-0000`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Raw timezone text, e.g. `+0200`.
    pub tz: String,
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz
        )
    }
}

/// A commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Parent ids in stored order. The verifier enforces a maximum of two.
    pub parents: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    /// PEM-wrapped SSH or armored PGP signature, newline-terminated,
    /// exactly as unfolded from the `gpgsig` header.
    pub signature: Option<String>,
    /// Freeform message, no added trailing newline.
    pub message: String,
}

/// An annotated tag object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedTag {
    pub target: ObjectId,
    pub target_kind: ObjectKind,
    pub name: String,
    pub tagger: Person,
    /// Armored signature appended verbatim after the message, if present.
    pub signature: Option<String>,
    pub message: String,
}

/// Tagged union over the decoded variants.
#[derive(Clone, Debug)]
pub enum GitObject {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(AnnotatedTag),
}

impl GitObject {
    /// The object's type tag.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_octal_roundtrip() {
        for mode in [
            EntryMode::Dir,
            EntryMode::Regular,
            EntryMode::Deprecated,
            EntryMode::Executable,
            EntryMode::Symlink,
            EntryMode::Submodule,
        ] {
            let parsed = u32::from_str_radix(mode.octal_text(), 8).unwrap();
            assert_eq!(EntryMode::from_octal(parsed), Some(mode));
        }
        assert_eq!(EntryMode::from_octal(0o100600), None);
    }

    #[test]
    fn mode_classification() {
        assert!(EntryMode::Dir.is_tree());
        assert!(!EntryMode::Dir.is_file());
        assert!(EntryMode::Regular.is_file());
        assert!(EntryMode::Executable.is_file());
        assert!(EntryMode::Deprecated.is_file());
        assert!(!EntryMode::Symlink.is_file());
    }

    #[test]
    fn kind_name_roundtrip() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::parse("ofs-delta"), None);
    }

    #[test]
    fn person_display() {
        let person = Person {
            name: "Alice".into(),
            email: "a@x".into(),
            timestamp: 1_700_000_000,
            tz: "+0000".into(),
        };
        assert_eq!(person.to_string(), "Alice <a@x> 1700000000 +0000");
    }
}

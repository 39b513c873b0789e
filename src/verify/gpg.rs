//! OpenPGP signature verification.
//!
//! Commits and tags signed with `gpg` carry an ASCII-armored detached
//! signature over the object serialization without the signature block.
//! Verification checks the signature against the identity's configured
//! key (primary or any signing subkey) and then requires that one of the
//! key's user ids carries the committer/tagger email — a valid signature
//! from an unrelated key is not enough.

use std::fmt;

use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};

use crate::stdx::KeySet;

/// OpenPGP verification failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum GpgError {
    /// Armored key or signature failed to parse.
    Parse { what: &'static str, detail: String },
    /// The signature does not verify under the key or any subkey.
    VerificationFailed { detail: String },
    /// No user id on the key matches the expected email.
    EmailMismatch { email: String },
}

impl fmt::Display for GpgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { what, detail } => write!(f, "failed to parse {what}: {detail}"),
            Self::VerificationFailed { detail } => {
                write!(f, "failed to verify signature: {detail}")
            }
            Self::EmailMismatch { email } => {
                write!(f, "GPG key does not match email '{email}'")
            }
        }
    }
}

impl std::error::Error for GpgError {}

/// Verifies an armored detached signature over `content` and checks the
/// key's user ids for `signer_email`.
pub fn verify_detached(
    armored_key: &str,
    armored_signature: &str,
    content: &[u8],
    signer_email: &str,
) -> Result<(), GpgError> {
    let (key, _) = SignedPublicKey::from_string(armored_key).map_err(|err| GpgError::Parse {
        what: "public key",
        detail: err.to_string(),
    })?;
    let (signature, _) =
        StandaloneSignature::from_string(armored_signature).map_err(|err| GpgError::Parse {
            what: "signature",
            detail: err.to_string(),
        })?;

    verify_with_any_key(&key, &signature, content)?;

    let emails = user_id_emails(&key);
    if !emails.contains(&signer_email.to_owned()) {
        return Err(GpgError::EmailMismatch {
            email: signer_email.to_owned(),
        });
    }

    Ok(())
}

/// Tries the primary key, then each subkey.
fn verify_with_any_key(
    key: &SignedPublicKey,
    signature: &StandaloneSignature,
    content: &[u8],
) -> Result<(), GpgError> {
    let mut last_error = match signature.verify(key, content) {
        Ok(()) => return Ok(()),
        Err(err) => err.to_string(),
    };

    for subkey in &key.public_subkeys {
        match signature.verify(subkey, content) {
            Ok(()) => return Ok(()),
            Err(err) => last_error = err.to_string(),
        }
    }

    Err(GpgError::VerificationFailed { detail: last_error })
}

/// Collects the emails of every user id on the key.
fn user_id_emails(key: &SignedPublicKey) -> KeySet<String> {
    let mut emails = KeySet::new();
    for user in &key.details.users {
        let text = String::from_utf8_lossy(user.id.id());
        if let Some(email) = email_of_user_id(&text) {
            emails.insert(email.to_owned());
        }
    }
    emails
}

/// Extracts the email from a `Name <email>` user id; a bare id without
/// brackets is treated as the email itself.
fn email_of_user_id(user_id: &str) -> Option<&str> {
    match (user_id.rfind('<'), user_id.rfind('>')) {
        (Some(open), Some(close)) if open < close => Some(&user_id[open + 1..close]),
        (None, None) => {
            let trimmed = user_id.trim();
            (!trimmed.is_empty()).then_some(trimmed)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_extraction() {
        assert_eq!(
            email_of_user_id("Alice Example <alice@example.com>"),
            Some("alice@example.com")
        );
        assert_eq!(email_of_user_id("bob@example.com"), Some("bob@example.com"));
        assert_eq!(email_of_user_id("<only@example.com>"), Some("only@example.com"));
        assert_eq!(email_of_user_id("broken <x"), None);
        assert_eq!(email_of_user_id(""), None);
    }

    #[test]
    fn malformed_armor_is_a_parse_error() {
        let err = verify_detached("not armor", "also not armor", b"data", "a@x").unwrap_err();
        assert!(matches!(err, GpgError::Parse { what: "public key", .. }));
    }
}

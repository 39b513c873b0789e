//! SSH signature (`SSHSIG`) parsing and verification.
//!
//! Git writes SSH signatures in the OpenSSH `SSHSIG` v1 format: the magic
//! preamble, a version, the signer's public key blob, a namespace (always
//! `git` for commit and tag signatures), a reserved string, the hash
//! algorithm applied to the signed content, and the signature blob.
//!
//! Verification reconstructs the signed blob —
//! `"SSHSIG" || pack(namespace, "", hash-alg, H(content))` — and checks it
//! against the public key. For FIDO (`sk-`) keys the inner signature covers
//! `H(application) || flags || counter || H(signed-blob)` instead, and the
//! flags byte carries the user-present / user-verified bits that the
//! policy rules may require.
//!
//! Wire parsing is done by hand; the format is a short sequence of
//! length-prefixed strings.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Verifier as _;
use sha2::{Digest, Sha256, Sha512};

const SSHSIG_MAGIC: &[u8; 6] = b"SSHSIG";
const SSHSIG_VERSION: u32 = 1;
const PEM_HEADER: &str = "-----BEGIN SSH SIGNATURE-----";
const PEM_FOOTER: &str = "-----END SSH SIGNATURE-----";

/// Namespace used for Git commit and tag signatures.
pub const NAMESPACE_GIT: &str = "git";

/// SSH signature handling failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum SshError {
    /// PEM wrapping is missing or malformed.
    Pem { detail: &'static str },
    /// Base64 body failed to decode.
    Base64(base64::DecodeError),
    /// Wire data ended early or has trailing garbage.
    Truncated,
    /// Magic preamble is not `SSHSIG`.
    BadMagic,
    /// Unsupported SSHSIG version.
    UnsupportedVersion { got: u32 },
    /// Public key algorithm is not supported.
    UnsupportedKeyType { algorithm: String },
    /// Hash algorithm is not `sha256` or `sha512`.
    UnsupportedHashAlgorithm { algorithm: String },
    /// Signature blob algorithm does not match the key.
    AlgorithmMismatch { key: String, signature: String },
    /// The cryptographic check failed.
    VerificationFailed,
    /// Key bytes are not a valid key for the declared algorithm.
    MalformedKey { detail: &'static str },
    /// Signature bytes are not a valid signature for the algorithm.
    MalformedSignature { detail: &'static str },
}

impl fmt::Display for SshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem { detail } => write!(f, "failed to unwrap signature: {detail}"),
            Self::Base64(err) => write!(f, "failed to decode base64: {err}"),
            Self::Truncated => f.write_str("truncated SSH wire data"),
            Self::BadMagic => f.write_str("missing SSHSIG magic preamble"),
            Self::UnsupportedVersion { got } => write!(f, "unsupported SSHSIG version {got}"),
            Self::UnsupportedKeyType { algorithm } => {
                write!(f, "unsupported public key type {algorithm}")
            }
            Self::UnsupportedHashAlgorithm { algorithm } => {
                write!(f, "unsupported hash algorithm: {algorithm}")
            }
            Self::AlgorithmMismatch { key, signature } => {
                write!(f, "signature algorithm {signature} does not match key {key}")
            }
            Self::VerificationFailed => f.write_str("signature verification failed"),
            Self::MalformedKey { detail } => write!(f, "malformed public key: {detail}"),
            Self::MalformedSignature { detail } => write!(f, "malformed signature: {detail}"),
        }
    }
}

impl std::error::Error for SshError {}

/// A parsed `SSHSIG` envelope.
#[derive(Clone, Debug)]
pub struct SshSignature {
    pub version: u32,
    /// Signer's public key in SSH wire form (used for key-set lookup).
    pub public_key_blob: Vec<u8>,
    pub namespace: String,
    pub hash_algorithm: String,
    pub signature_blob: Vec<u8>,
}

impl SshSignature {
    /// Parses the PEM-wrapped signature text attached to a commit or tag.
    pub fn parse_pem(text: &str) -> Result<Self, SshError> {
        let body = unwrap_pem(text)?;
        let raw = BASE64.decode(body).map_err(SshError::Base64)?;
        Self::parse_wire(&raw)
    }

    /// Parses the raw SSHSIG wire encoding.
    pub fn parse_wire(data: &[u8]) -> Result<Self, SshError> {
        if data.len() < SSHSIG_MAGIC.len() || &data[..SSHSIG_MAGIC.len()] != SSHSIG_MAGIC {
            return Err(SshError::BadMagic);
        }

        let mut reader = WireReader::new(&data[SSHSIG_MAGIC.len()..]);
        let version = reader.read_u32()?;
        if version != SSHSIG_VERSION {
            return Err(SshError::UnsupportedVersion { got: version });
        }

        let public_key_blob = reader.read_string()?.to_vec();
        let namespace = reader.read_text()?;
        let _reserved = reader.read_string()?;
        let hash_algorithm = reader.read_text()?;
        let signature_blob = reader.read_string()?.to_vec();

        Ok(Self {
            version,
            public_key_blob,
            namespace,
            hash_algorithm,
            signature_blob,
        })
    }

    /// Parses the U2F flags/counter trailer of the signature blob.
    ///
    /// Only meaningful for `sk-` signatures; other blobs fail with
    /// `Truncated`.
    pub fn security_key_flags(&self) -> Result<U2fFlags, SshError> {
        let mut reader = WireReader::new(&self.signature_blob);
        let _algorithm = reader.read_string()?;
        let _inner = reader.read_string()?;
        let flags = reader.read_u8()?;
        let _counter = reader.read_u32()?;
        Ok(U2fFlags { flags })
    }
}

/// Flags byte of a FIDO/U2F signature.
///
/// See OpenSSH `PROTOCOL.u2f`: bit 0 is user-present, bit 2 user-verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct U2fFlags {
    pub flags: u8,
}

impl U2fFlags {
    #[inline]
    #[must_use]
    pub const fn user_present(self) -> bool {
        self.flags & 1 != 0
    }

    #[inline]
    #[must_use]
    pub const fn user_verified(self) -> bool {
        (self.flags >> 2) & 1 != 0
    }
}

/// A supported SSH public key.
#[derive(Clone, Debug)]
pub enum SshPublicKey {
    Ed25519 {
        key: [u8; 32],
    },
    SkEd25519 {
        key: [u8; 32],
        application: String,
    },
    EcdsaP256 {
        /// SEC1-encoded curve point.
        point: Vec<u8>,
    },
    SkEcdsaP256 {
        point: Vec<u8>,
        application: String,
    },
}

impl SshPublicKey {
    /// The key's SSH algorithm name.
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        match self {
            Self::Ed25519 { .. } => "ssh-ed25519",
            Self::SkEd25519 { .. } => "sk-ssh-ed25519@openssh.com",
            Self::EcdsaP256 { .. } => "ecdsa-sha2-nistp256",
            Self::SkEcdsaP256 { .. } => "sk-ecdsa-sha2-nistp256@openssh.com",
        }
    }

    /// True for FIDO/U2F-backed keys, the only kind that can attest
    /// user presence and verification.
    #[must_use]
    pub const fn is_security_key(&self) -> bool {
        matches!(self, Self::SkEd25519 { .. } | Self::SkEcdsaP256 { .. })
    }

    /// Parses an SSH wire-form public key blob.
    pub fn parse_wire(blob: &[u8]) -> Result<Self, SshError> {
        let mut reader = WireReader::new(blob);
        let algorithm = reader.read_text()?;

        match algorithm.as_str() {
            "ssh-ed25519" => {
                let key = reader.read_string()?;
                Ok(Self::Ed25519 {
                    key: key
                        .try_into()
                        .map_err(|_| SshError::MalformedKey { detail: "ed25519 key must be 32 bytes" })?,
                })
            }
            "sk-ssh-ed25519@openssh.com" => {
                let key: [u8; 32] = reader
                    .read_string()?
                    .try_into()
                    .map_err(|_| SshError::MalformedKey { detail: "ed25519 key must be 32 bytes" })?;
                let application = reader.read_text()?;
                Ok(Self::SkEd25519 { key, application })
            }
            "ecdsa-sha2-nistp256" => {
                let curve = reader.read_text()?;
                if curve != "nistp256" {
                    return Err(SshError::MalformedKey { detail: "unexpected curve name" });
                }
                let point = reader.read_string()?.to_vec();
                Ok(Self::EcdsaP256 { point })
            }
            "sk-ecdsa-sha2-nistp256@openssh.com" => {
                let curve = reader.read_text()?;
                if curve != "nistp256" {
                    return Err(SshError::MalformedKey { detail: "unexpected curve name" });
                }
                let point = reader.read_string()?.to_vec();
                let application = reader.read_text()?;
                Ok(Self::SkEcdsaP256 { point, application })
            }
            _ => Err(SshError::UnsupportedKeyType { algorithm }),
        }
    }

    /// Parses an authorized_keys-style line (`<algo> <base64-blob> [comment]`),
    /// returning both the wire blob (the key-set lookup key) and the parsed key.
    pub fn parse_authorized_key(text: &str) -> Result<(Vec<u8>, Self), SshError> {
        let mut parts = text.split_whitespace();
        let _algorithm = parts.next().ok_or(SshError::MalformedKey { detail: "empty key line" })?;
        let body = parts.next().ok_or(SshError::MalformedKey { detail: "missing key body" })?;
        let blob = BASE64.decode(body).map_err(SshError::Base64)?;
        let key = Self::parse_wire(&blob)?;
        Ok((blob, key))
    }

    fn application(&self) -> Option<&str> {
        match self {
            Self::SkEd25519 { application, .. } | Self::SkEcdsaP256 { application, .. } => {
                Some(application)
            }
            _ => None,
        }
    }
}

/// Verifies an SSHSIG signature over `content` under `namespace`.
///
/// The caller supplies the namespace (`git` for commits and tags); a
/// signature produced under a different namespace fails verification
/// because the reconstructed signed blob differs.
pub fn verify_signature(
    key: &SshPublicKey,
    content: &[u8],
    signature: &SshSignature,
    namespace: &str,
) -> Result<(), SshError> {
    let content_hash: Vec<u8> = match signature.hash_algorithm.as_str() {
        "sha256" => Sha256::digest(content).to_vec(),
        "sha512" => Sha512::digest(content).to_vec(),
        other => {
            return Err(SshError::UnsupportedHashAlgorithm {
                algorithm: other.to_owned(),
            })
        }
    };

    let mut signed_blob = Vec::with_capacity(64 + content_hash.len());
    signed_blob.extend_from_slice(SSHSIG_MAGIC);
    push_string(&mut signed_blob, namespace.as_bytes());
    push_string(&mut signed_blob, b"");
    push_string(&mut signed_blob, signature.hash_algorithm.as_bytes());
    push_string(&mut signed_blob, &content_hash);

    let mut reader = WireReader::new(&signature.signature_blob);
    let algorithm = reader.read_text()?;
    if algorithm != key.algorithm() {
        return Err(SshError::AlgorithmMismatch {
            key: key.algorithm().to_owned(),
            signature: algorithm,
        });
    }
    let inner = reader.read_string()?;

    // For security keys the inner signature covers a composed message
    // that binds the application id, flags, and counter.
    let message: Vec<u8> = if key.is_security_key() {
        let flags = reader.read_u8()?;
        let counter = reader.read_u32()?;
        let application = key.application().expect("security key has application");

        let mut composed = Vec::with_capacity(32 + 1 + 4 + 32);
        composed.extend_from_slice(&Sha256::digest(application.as_bytes()));
        composed.push(flags);
        composed.extend_from_slice(&counter.to_be_bytes());
        composed.extend_from_slice(&Sha256::digest(&signed_blob));
        composed
    } else {
        signed_blob
    };

    match key {
        SshPublicKey::Ed25519 { key } | SshPublicKey::SkEd25519 { key, .. } => {
            let verifying = ed25519_dalek::VerifyingKey::from_bytes(key)
                .map_err(|_| SshError::MalformedKey { detail: "invalid ed25519 point" })?;
            let signature = ed25519_dalek::Signature::from_slice(inner)
                .map_err(|_| SshError::MalformedSignature { detail: "bad ed25519 signature length" })?;
            verifying
                .verify(&message, &signature)
                .map_err(|_| SshError::VerificationFailed)
        }
        SshPublicKey::EcdsaP256 { point } | SshPublicKey::SkEcdsaP256 { point, .. } => {
            let verifying = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                .map_err(|_| SshError::MalformedKey { detail: "invalid P-256 point" })?;
            let signature = parse_ecdsa_blob(inner)?;
            verifying
                .verify(&message, &signature)
                .map_err(|_| SshError::VerificationFailed)
        }
    }
}

/// Parses the `mpint r || mpint s` ECDSA signature blob.
fn parse_ecdsa_blob(blob: &[u8]) -> Result<p256::ecdsa::Signature, SshError> {
    let mut reader = WireReader::new(blob);
    let r = reader.read_string()?;
    let s = reader.read_string()?;

    let r = fixed_scalar(r)?;
    let s = fixed_scalar(s)?;
    p256::ecdsa::Signature::from_scalars(r, s)
        .map_err(|_| SshError::MalformedSignature { detail: "invalid ECDSA scalars" })
}

/// Converts an SSH mpint to a fixed 32-byte scalar.
fn fixed_scalar(mpint: &[u8]) -> Result<[u8; 32], SshError> {
    let trimmed = match mpint {
        [0, rest @ ..] => rest,
        other => other,
    };
    if trimmed.len() > 32 {
        return Err(SshError::MalformedSignature { detail: "ECDSA scalar too long" });
    }
    let mut out = [0u8; 32];
    out[32 - trimmed.len()..].copy_from_slice(trimmed);
    Ok(out)
}

fn unwrap_pem(text: &str) -> Result<String, SshError> {
    let trimmed = text.trim_matches(['\n', ' ']);
    let rest = trimmed
        .strip_prefix(PEM_HEADER)
        .ok_or(SshError::Pem { detail: "signature does not start with header" })?;
    let body = rest
        .strip_suffix(PEM_FOOTER)
        .ok_or(SshError::Pem { detail: "signature does not end with footer" })?;
    Ok(body.chars().filter(|c| !c.is_whitespace()).collect())
}

/// Wraps raw SSHSIG bytes in the PEM armor Git stores.
#[must_use]
pub fn wrap_pem(raw: &[u8]) -> String {
    let encoded = BASE64.encode(raw);
    let mut out = String::with_capacity(encoded.len() + 80);
    out.push_str(PEM_HEADER);
    out.push('\n');
    for chunk in encoded.as_bytes().chunks(70) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
        out.push('\n');
    }
    out.push_str(PEM_FOOTER);
    out.push('\n');
    out
}

/// Appends an SSH length-prefixed string.
pub fn push_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Cursor over SSH wire data.
struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, SshError> {
        let byte = *self.data.get(self.pos).ok_or(SshError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u32(&mut self) -> Result<u32, SshError> {
        if self.data.len() < self.pos + 4 {
            return Err(SshError::Truncated);
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_string(&mut self) -> Result<&'a [u8], SshError> {
        let len = self.read_u32()? as usize;
        if self.data.len() < self.pos + len {
            return Err(SshError::Truncated);
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_text(&mut self) -> Result<String, SshError> {
        let bytes = self.read_string()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SshError::MalformedSignature { detail: "non-UTF-8 wire string" })
    }
}

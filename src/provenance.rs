//! DSSE pre-authentication encoding.
//!
//! The one piece of the attestation path the core carries: the byte
//! string a DSSE signature is computed over. Envelope construction and
//! signing live with the CLI, not here.
//!
//! `PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload`
//! where lengths are decimal ASCII.

/// DSSE payload type for in-toto statements.
pub const PAYLOAD_TYPE_INTOTO: &str = "application/vnd.in-toto+json";

/// Computes the DSSE v1 pre-authentication encoding.
#[must_use]
pub fn pre_authentication_encoding(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + payload_type.len() + payload.len());
    out.extend_from_slice(b"DSSEv1 ");
    out.extend_from_slice(payload_type.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pae_vector() {
        let pae = pre_authentication_encoding(PAYLOAD_TYPE_INTOTO, b"testPayload");
        assert_eq!(
            pae,
            b"DSSEv1 28 application/vnd.in-toto+json 11 testPayload".to_vec()
        );
    }

    #[test]
    fn pae_empty_payload() {
        let pae = pre_authentication_encoding("t", b"");
        assert_eq!(pae, b"DSSEv1 1 t 0 ".to_vec());
    }
}

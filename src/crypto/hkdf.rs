//! HKDF-Extract / HKDF-Expand-Label, built directly on `ring::hmac` rather
//! than `ring::hkdf`.
//!
//! `ring::hkdf::Prk` deliberately does not expose its raw bytes (it is
//! designed to prevent exactly the kind of raw-secret handling this
//! protocol requires: epoch secrets must be byte-comparable, storable in
//! `KeySchedule`, and usable as HKDF-Extract salt for the *next* epoch).
//! HKDF-Extract is simply `HMAC-Hash(salt, ikm)` and HKDF-Expand for a
//! single block (our outputs are always exactly `Hash.length` bytes, i.e.
//! one block) is `HMAC-Hash(prk, info || 0x01)` — both fully expressible
//! with `ring::hmac`, which does hand back raw bytes via `Tag::as_ref()`.
//! This is the same approach the `ring`-based KAT tests in the wider MLS
//! implementation ecosystem use when raw secret material must cross a
//! module boundary.

use crate::crypto::ciphersuite::CipherSuite;
use crate::wire;

/// HKDF-Extract(salt, ikm) = HMAC-Hash(salt, ikm).
pub fn hkdf_extract(cs: &CipherSuite, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    let key = ring::hmac::Key::new(cs.hmac_alg, salt);
    ring::hmac::sign(&key, ikm).as_ref().to_vec()
}

/// `struct { opaque group_context<0..255>; uint16 length; opaque
/// label<7..255>; opaque context<0..2^32-1>; } HkdfLabel;` packed with the
/// crate's own wire codec (spec §4.3). `group_context` here is
/// `Hash(context)`, matching `original_source/libMLS/libMLS/crypto.py`.
fn hkdf_label_bytes(cs: &CipherSuite, label: &[u8], context: &[u8]) -> Vec<u8> {
    let context_hash = cs.hash(context);

    let mut out = Vec::new();
    wire::write_vec(&mut out, &context_hash);
    wire::write_u32(&mut out, cs.hash_length() as u32);
    let mut full_label = b"mls10 ".to_vec();
    full_label.extend_from_slice(label);
    wire::write_vec(&mut out, &full_label);
    wire::write_vec(&mut out, context);
    out
}

/// HKDF-Expand-Label(secret, label, context) — single HMAC block, since
/// every derivation in this key schedule requests exactly `Hash.length`
/// output bytes.
pub fn hkdf_expand_label(cs: &CipherSuite, secret: &[u8], label: &[u8], context: &[u8]) -> Vec<u8> {
    let info = hkdf_label_bytes(cs, label, context);
    let key = ring::hmac::Key::new(cs.hmac_alg, secret);

    let mut block_input = info;
    block_input.push(0x01);

    let tag = ring::hmac::sign(&key, &block_input);
    let mut out = tag.as_ref().to_vec();
    out.truncate(cs.hash_length());
    out
}

/// Derive-Secret(secret, label, context) = HKDF-Expand-Label(secret, label,
/// context, Hash.length).
pub fn derive_secret(cs: &CipherSuite, secret: &[u8], label: &[u8], context: &[u8]) -> Vec<u8> {
    hkdf_expand_label(cs, secret, label, context)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ciphersuite::X25519_SHA256_AES128GCM;

    #[test]
    fn extract_is_deterministic_and_salt_sensitive() {
        let cs = &X25519_SHA256_AES128GCM;
        let a = hkdf_extract(cs, b"salt-a", b"ikm");
        let b = hkdf_extract(cs, b"salt-a", b"ikm");
        let c = hkdf_extract(cs, b"salt-b", b"ikm");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn expand_label_differs_per_label() {
        let cs = &X25519_SHA256_AES128GCM;
        let secret = vec![1u8; 32];
        let node = hkdf_expand_label(cs, &secret, b"node", b"ctx");
        let path = hkdf_expand_label(cs, &secret, b"path", b"ctx");
        assert_ne!(node, path);
        assert_eq!(node.len(), cs.hash_length());
    }
}

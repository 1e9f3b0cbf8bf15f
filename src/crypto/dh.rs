use std::convert::TryInto;

use clear_on_drop::clear::Clear;

use crate::error::Error;
use crate::wire::{Codec, Reader};

pub const DH_PUBLIC_KEY_LEN: usize = 32;
pub const DH_PRIVATE_KEY_LEN: usize = 32;

/// A fixed 32-byte X25519 public key (spec §6: "Public keys are fixed 32
/// bytes (X25519 suite)").
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DhPublicKey(pub(crate) [u8; DH_PUBLIC_KEY_LEN]);

impl DhPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<DhPublicKey, Error> {
        let arr: [u8; DH_PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::MalformedMessage("public key is not 32 bytes".into()))?;
        Ok(DhPublicKey(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DH_PUBLIC_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DhPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DhPublicKey({})", hex_string(&self.0))
    }
}

impl Codec for DhPublicKey {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.0);
    }

    fn decode(r: &mut Reader) -> Result<DhPublicKey, Error> {
        DhPublicKey::from_bytes(&r.read_vec()?)
    }
}

impl crate::wire::Message for DhPublicKey {}

/// The raw 32-byte digest that is a node's private key. Per spec §4.3:
/// "private_key = hash(material); public_key = KEM-public(private_key)" —
/// we store the raw digest, not a clamped scalar, and clamp only when a
/// Diffie-Hellman operation actually needs a scalar. Zeroed on drop.
pub struct DhPrivateKey([u8; DH_PRIVATE_KEY_LEN]);

impl DhPrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<DhPrivateKey, Error> {
        let arr: [u8; DH_PRIVATE_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::MalformedMessage("private key is not 32 bytes".into()))?;
        Ok(DhPrivateKey(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DH_PRIVATE_KEY_LEN] {
        &self.0
    }

    fn static_secret(&self) -> x25519_dalek::StaticSecret {
        x25519_dalek::StaticSecret::from(self.0)
    }

    /// Derives the X25519 public key for this private key by clamping the
    /// stored scalar and multiplying by the base point.
    pub fn derive_public(&self) -> DhPublicKey {
        let public = x25519_dalek::PublicKey::from(&self.static_secret());
        DhPublicKey(*public.as_bytes())
    }

    /// Computes the X25519 shared secret `DH(self, their_public)`.
    pub fn diffie_hellman(&self, their_public: &DhPublicKey) -> [u8; 32] {
        let their_public = x25519_dalek::PublicKey::from(their_public.0);
        *self.static_secret().diffie_hellman(&their_public).as_bytes()
    }
}

impl Clone for DhPrivateKey {
    fn clone(&self) -> DhPrivateKey {
        DhPrivateKey(self.0)
    }
}

impl Drop for DhPrivateKey {
    fn drop(&mut self) {
        self.0.clear();
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Message;

    #[test]
    fn derive_public_is_deterministic() {
        let sk = DhPrivateKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(sk.derive_public(), sk.derive_public());
    }

    #[test]
    fn diffie_hellman_agrees_both_ways() {
        let a = DhPrivateKey::from_bytes(&[1u8; 32]).unwrap();
        let b = DhPrivateKey::from_bytes(&[2u8; 32]).unwrap();

        let a_pub = a.derive_public();
        let b_pub = b.derive_public();

        assert_eq!(a.diffie_hellman(&b_pub), b.diffie_hellman(&a_pub));
    }

    #[test]
    fn public_key_round_trips_through_codec() {
        let pk = DhPrivateKey::from_bytes(&[42u8; 32]).unwrap().derive_public();
        let packed = pk.pack().unwrap();
        assert_eq!(<DhPublicKey as Message>::from_bytes(&packed).unwrap(), pk);
    }
}

//! Signing keys and signatures carried in a `Credential` (spec §4.2,
//! `original_source`'s `UserInitKey.signature`/`identity` fields). Signature
//! *verification* is wired and working here; the decision not to call it
//! during message processing belongs to `group_state`, not to this module,
//! and is recorded as an Open Question resolution in DESIGN.md.

use ed25519_dalek::{Keypair, PublicKey, Signature as DalekSignature, Signer, Verifier};

use crate::error::Error;
use crate::wire::{Codec, Reader};

pub const SIGNATURE_PUBLIC_KEY_LEN: usize = 32;

/// An Ed25519 signing keypair, held by a group member for signing the
/// handshake messages it proposes.
pub struct SigningKey(Keypair);

impl SigningKey {
    pub fn generate(mut rng: &mut dyn crate::crypto::rng::CryptoRng) -> SigningKey {
        SigningKey(Keypair::generate(&mut rng))
    }

    pub fn public_key(&self) -> SignaturePublicKey {
        SignaturePublicKey(self.0.public)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

/// The public half of a `SigningKey`, as carried in a `Credential`.
#[derive(Clone, Copy)]
pub struct SignaturePublicKey(PublicKey);

impl SignaturePublicKey {
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }
}

impl PartialEq for SignaturePublicKey {
    fn eq(&self, other: &SignaturePublicKey) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}
impl Eq for SignaturePublicKey {}

impl std::fmt::Debug for SignaturePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignaturePublicKey({})", hex_string(self.0.as_bytes()))
    }
}

impl Codec for SignaturePublicKey {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, self.0.as_bytes());
    }

    fn decode(r: &mut Reader) -> Result<SignaturePublicKey, Error> {
        let bytes = r.read_vec()?;
        let public = PublicKey::from_bytes(&bytes)
            .map_err(|_| Error::MalformedMessage("invalid ed25519 public key".into()))?;
        Ok(SignaturePublicKey(public))
    }
}

/// A detached Ed25519 signature over a handshake or `UserInitKey` payload.
#[derive(Clone)]
pub struct Signature(DalekSignature);

impl PartialEq for Signature {
    fn eq(&self, other: &Signature) -> bool {
        self.0.to_bytes()[..] == other.0.to_bytes()[..]
    }
}
impl Eq for Signature {}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex_string(&self.0.to_bytes()[..]))
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Codec for Signature {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.0.to_bytes()[..]);
    }

    fn decode(r: &mut Reader) -> Result<Signature, Error> {
        let bytes = r.read_vec()?;
        let sig = DalekSignature::from_bytes(&bytes)
            .map_err(|_| Error::MalformedMessage("invalid ed25519 signature".into()))?;
        Ok(Signature(sig))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_verify_succeeds() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = key.sign(b"group operation bytes");
        assert!(key.public_key().verify(b"group operation bytes", &sig));
    }

    #[test]
    fn verify_fails_on_tampered_message() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = key.sign(b"group operation bytes");
        assert!(!key.public_key().verify(b"different bytes", &sig));
    }
}

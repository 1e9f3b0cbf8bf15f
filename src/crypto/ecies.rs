//! ECIES-style encryption of a path secret to a ratchet-tree node's public
//! key (spec §4.3, `ecies_encrypt`/`ecies_decrypt`): an ephemeral X25519 key
//! is Diffie-Hellman'd against the recipient's public key, the shared
//! secret is run through HKDF to derive an AEAD key and IV, and the path
//! secret is sealed under that key. Grounded in the same call shape the
//! teacher's `RatchetTree::encrypt_path_secrets` uses
//! (`ecies::ecies_encrypt(cs, their_public_key, plaintext, csprng)`).

use crate::crypto::ciphersuite::{CipherSuite, AEAD_IV_LEN, AEAD_KEY_LEN};
use crate::crypto::dh::{DhPrivateKey, DhPublicKey};
use crate::crypto::hkdf;
use crate::crypto::rng::CryptoRng;
use crate::error::Error;
use crate::wire::{Codec, Reader};

/// The result of `ecies_encrypt`: an ephemeral public key plus the sealed
/// path secret. Wire-compatible with `original_source`'s
/// `HPKECiphertext { ephemeral_key, ciphertext }`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EciesCiphertext {
    pub ephemeral_public_key: DhPublicKey,
    pub ciphertext: Vec<u8>,
}

impl Codec for EciesCiphertext {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.ephemeral_public_key.encode(buf);
        crate::wire::write_vec(buf, &self.ciphertext);
    }

    fn decode(r: &mut Reader) -> Result<EciesCiphertext, Error> {
        let ephemeral_public_key = DhPublicKey::decode(r)?;
        let ciphertext = r.read_vec()?;
        Ok(EciesCiphertext {
            ephemeral_public_key,
            ciphertext,
        })
    }
}

/// Derives the (key, iv) pair an ECIES exchange seals under, from the raw
/// DH output. `"ecies key"` / `"ecies iv"` are this crate's own expansion
/// labels; the underlying DH secret is never used directly as key material.
fn derive_key_iv(cs: &CipherSuite, dh_secret: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let prk = hkdf::hkdf_extract(cs, &[], dh_secret);
    let mut key = hkdf::hkdf_expand_label(cs, &prk, b"ecies key", b"");
    key.truncate(AEAD_KEY_LEN);
    let mut iv = hkdf::hkdf_expand_label(cs, &prk, b"ecies iv", b"");
    iv.truncate(AEAD_IV_LEN);
    (key, iv)
}

pub fn ecies_encrypt(
    cs: &'static CipherSuite,
    their_public_key: &DhPublicKey,
    plaintext: &[u8],
    rng: &mut dyn CryptoRng,
) -> Result<EciesCiphertext, Error> {
    let mut ephemeral_bytes = [0u8; 32];
    rng.fill_bytes(&mut ephemeral_bytes);
    let ephemeral_private = DhPrivateKey::from_bytes(&ephemeral_bytes)?;
    let ephemeral_public_key = ephemeral_private.derive_public();

    let shared_secret = ephemeral_private.diffie_hellman(their_public_key);
    let (key, iv) = derive_key_iv(cs, &shared_secret);

    let ciphertext = cs.seal(&key, &iv, &[], plaintext)?;
    Ok(EciesCiphertext {
        ephemeral_public_key,
        ciphertext,
    })
}

pub fn ecies_decrypt(
    cs: &'static CipherSuite,
    our_private_key: &DhPrivateKey,
    ciphertext: &EciesCiphertext,
) -> Result<Vec<u8>, Error> {
    let shared_secret = our_private_key.diffie_hellman(&ciphertext.ephemeral_public_key);
    let (key, iv) = derive_key_iv(cs, &shared_secret);
    cs.open(&key, &iv, &[], &ciphertext.ciphertext)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ciphersuite::X25519_SHA256_AES128GCM;
    use rand::rngs::OsRng;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let cs = &X25519_SHA256_AES128GCM;
        let recipient = DhPrivateKey::from_bytes(&[5u8; 32]).unwrap();
        let recipient_public = recipient.derive_public();

        let ct = ecies_encrypt(cs, &recipient_public, b"path secret bytes", &mut OsRng).unwrap();
        let pt = ecies_decrypt(cs, &recipient, &ct).unwrap();
        assert_eq!(pt, b"path secret bytes");
    }

    #[test]
    fn wrong_recipient_fails_to_decrypt() {
        let cs = &X25519_SHA256_AES128GCM;
        let recipient = DhPrivateKey::from_bytes(&[5u8; 32]).unwrap();
        let wrong_key = DhPrivateKey::from_bytes(&[6u8; 32]).unwrap();
        let recipient_public = recipient.derive_public();

        let ct = ecies_encrypt(cs, &recipient_public, b"secret", &mut OsRng).unwrap();
        assert!(ecies_decrypt(cs, &wrong_key, &ct).is_err());
    }
}

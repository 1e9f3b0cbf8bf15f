//! The per-epoch key schedule (spec §4.7, `original_source`'s
//! `key_schedule.py`): folds an epoch's `update_secret` into the running
//! `init_secret` and fans the result out into the five secrets every other
//! module needs (sender-data, handshake, application, confirmation, and the
//! next epoch's init secret).

use crate::crypto::ciphersuite::CipherSuite;
use crate::crypto::hkdf;

/// The derived secrets for one group epoch. Everything here is `Hash.length`
/// bytes, matching the key schedule's use of `Derive-Secret`.
#[derive(Clone)]
pub(crate) struct KeySchedule {
    cs: &'static CipherSuite,
    init_secret: Vec<u8>,
    epoch_secret: Vec<u8>,
    pub(crate) sender_data_secret: Vec<u8>,
    pub(crate) handshake_secret: Vec<u8>,
    pub(crate) application_secret: Vec<u8>,
    pub(crate) confirmation_key: Vec<u8>,
}

impl KeySchedule {
    /// A fresh key schedule with an all-zero init secret, the state before any epoch has been
    /// established (spec §4.7: "initial `init_secret` is 0").
    pub(crate) fn new(cs: &'static CipherSuite) -> KeySchedule {
        KeySchedule {
            cs,
            init_secret: vec![0u8; cs.hash_length()],
            epoch_secret: Vec::new(),
            sender_data_secret: Vec::new(),
            handshake_secret: Vec::new(),
            application_secret: Vec::new(),
            confirmation_key: Vec::new(),
        }
    }

    /// A key schedule picking up an already-running group at `init_secret`, with no derived
    /// secrets of its own yet — used to reconstruct a joiner's key schedule from a `WelcomeInfo`,
    /// so it starts from the exact same `init_secret` the founder held at that epoch rather than
    /// re-deriving (and thereby changing) it.
    pub(crate) fn from_init_secret(cs: &'static CipherSuite, init_secret: &[u8]) -> KeySchedule {
        KeySchedule {
            cs,
            init_secret: init_secret.to_vec(),
            epoch_secret: Vec::new(),
            sender_data_secret: Vec::new(),
            handshake_secret: Vec::new(),
            application_secret: Vec::new(),
            confirmation_key: Vec::new(),
        }
    }

    pub(crate) fn init_secret(&self) -> &[u8] {
        &self.init_secret
    }

    pub(crate) fn epoch_secret(&self) -> &[u8] {
        &self.epoch_secret
    }

    /// Advances the schedule to a new epoch: `epoch_secret = HKDF-Extract(init_secret,
    /// update_secret)`, then every other secret is `Derive-Secret(epoch_secret, label,
    /// group_context)`.
    pub(crate) fn update(&mut self, update_secret: &[u8], group_context: &[u8]) {
        self.epoch_secret = hkdf::hkdf_extract(self.cs, &self.init_secret, update_secret);

        self.sender_data_secret = hkdf::derive_secret(self.cs, &self.epoch_secret, b"sender data", group_context);
        self.handshake_secret = hkdf::derive_secret(self.cs, &self.epoch_secret, b"handshake", group_context);
        self.application_secret = hkdf::derive_secret(self.cs, &self.epoch_secret, b"app", group_context);
        self.confirmation_key = hkdf::derive_secret(self.cs, &self.epoch_secret, b"confirm", group_context);
        self.init_secret = hkdf::derive_secret(self.cs, &self.epoch_secret, b"init", group_context);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ciphersuite::X25519_SHA256_AES128GCM;

    #[test]
    fn update_derives_distinct_secrets() {
        let cs = &X25519_SHA256_AES128GCM;
        let mut ks = KeySchedule::new(cs);
        ks.update(b"update secret", b"group context bytes");

        assert_ne!(ks.sender_data_secret, ks.handshake_secret);
        assert_ne!(ks.handshake_secret, ks.application_secret);
        assert_ne!(ks.application_secret, ks.confirmation_key);
        assert_eq!(ks.sender_data_secret.len(), cs.hash_length());
    }

    #[test]
    fn successive_epochs_produce_different_secrets() {
        let cs = &X25519_SHA256_AES128GCM;
        let mut ks = KeySchedule::new(cs);
        ks.update(b"first update", b"context 0");
        let first_app_secret = ks.application_secret.clone();

        ks.update(b"second update", b"context 1");
        assert_ne!(ks.application_secret, first_app_secret);
    }
}

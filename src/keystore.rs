//! The init-key directory a `Session` consults to add new members and to
//! recognize its own private keys (spec §4.9). `original_source`'s
//! `LocalKeyStoreMock` backs onto a process-wide `RemoteKeyStoreMock`
//! singleton; we replace that with an explicit `Keystore` handle every
//! `Session` is constructed with, so two sessions in the same process (as
//! in the integration tests) can either share one directory or use
//! independent ones, instead of silently sharing global mutable state.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::crypto::dh::{DhPrivateKey, DhPublicKey};

/// A directory of published init keys, plus the private halves a holder owns.
pub trait Keystore {
    /// Publishes `public_key` under `user_name`, and remembers `private_key` as one of ours.
    fn register_keypair(&self, user_name: &str, public_key: DhPublicKey, private_key: DhPrivateKey);

    /// Looks up the current published init key for `user_name`.
    fn fetch_init_key(&self, user_name: &str) -> Option<DhPublicKey>;

    /// Returns the private key for `public_key`, if this keystore's holder owns it.
    fn get_private_key(&self, public_key: &DhPublicKey) -> Option<DhPrivateKey>;
}

/// An in-memory `Keystore`, suitable for tests and single-process demos. Not backed by any
/// durable storage or network directory service.
#[derive(Default)]
pub struct MemoryKeystore {
    published: RefCell<HashMap<String, DhPublicKey>>,
    owned: RefCell<HashMap<[u8; 32], DhPrivateKey>>,
}

impl MemoryKeystore {
    pub fn new() -> MemoryKeystore {
        MemoryKeystore {
            published: RefCell::new(HashMap::new()),
            owned: RefCell::new(HashMap::new()),
        }
    }
}

impl Keystore for MemoryKeystore {
    fn register_keypair(&self, user_name: &str, public_key: DhPublicKey, private_key: DhPrivateKey) {
        self.owned.borrow_mut().insert(*public_key.as_bytes(), private_key);
        self.published.borrow_mut().insert(user_name.to_string(), public_key);
    }

    fn fetch_init_key(&self, user_name: &str) -> Option<DhPublicKey> {
        self.published.borrow().get(user_name).copied()
    }

    fn get_private_key(&self, public_key: &DhPublicKey) -> Option<DhPrivateKey> {
        self.owned.borrow().get(public_key.as_bytes()).cloned()
    }
}

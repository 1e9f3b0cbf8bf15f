//! A ratchet-tree group messaging core conforming to the MLS draft-07
//! design: a left-balanced binary tree of Diffie-Hellman keys, a per-epoch
//! HKDF key schedule derived from it, and the `Add`/`Update` handshake
//! operations that move the group from one epoch to the next.
//!
//! Ported from `original_source/libMLS`, following the structuring this
//! crate's own ratchet-tree module was grounded on. The module layout
//! mirrors that source file-for-file: `tree_math` is pure index arithmetic,
//! `ratchet_tree` owns the keyed tree, `key_schedule` derives an epoch's
//! secrets from it, `handshake`/`messages` are the wire types, `group_state`
//! is the state machine the `Session` façade drives.
//!
//! Non-goals (not implemented here): signature verification during message
//! processing, `Remove`, and anything related to transport or discovery.
//! See DESIGN.md for the reasoning behind each.

mod credential;
mod crypto;
mod error;
mod group_state;
mod handshake;
mod key_schedule;
mod keystore;
mod messages;
mod ratchet_tree;
mod session;
mod tree_math;
mod wire;

pub use credential::Credential;
pub use crypto::ciphersuite::{CipherSuite, X25519_SHA256_AES128GCM};
pub use crypto::dh::{DhPrivateKey, DhPublicKey};
pub use crypto::sig::{Signature, SignaturePublicKey, SigningKey};
pub use error::Error;
pub use group_state::WelcomeInfo;
pub use handshake::Welcome;
pub use keystore::{Keystore, MemoryKeystore};
pub use messages::MLSCiphertext;
pub use session::{open_welcome, seal_welcome, Handler, Session};

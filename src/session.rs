//! The user-facing façade over `GroupState` (spec §4.8/§4.9): frames
//! `GroupOperation`s and application payloads as `MLSPlaintext`/
//! `MLSCiphertext`, tracks which leaf in the tree is this participant's own,
//! and dispatches inbound messages to a pluggable `Handler`. Grounded in
//! `original_source/libMLS/libMLS/session.py` and
//! `abstract_application_handler.py`.
//!
//! `own_leaf_index` here is a *member count* (0, 1, 2, ...), matching the
//! Add/member-roster numbering `GroupState::add`/`process_add` use. It is
//! doubled into a raw tree-array index (`2 * own_leaf_index`) at every call
//! into `GroupState`, which indexes leaves directly in the array.
//!
//! Everything a caller needs to drive a group — `add_member`, `update`,
//! `process_message` — speaks only in `MLSCiphertext`/`WelcomeInfo`/
//! `Welcome`. The underlying `GroupAdd`/`GroupUpdate`/`GroupOperation` wire
//! types never leave this module: they are always immediately framed into
//! (or unwrapped out of) a `Handshake` inside an `MLSCiphertext`.

use crate::credential::Credential;
use crate::crypto::ciphersuite::CipherSuite;
use crate::crypto::dh::{DhPrivateKey, DhPublicKey};
use crate::crypto::ecies;
use crate::crypto::rng::CryptoRng;
use crate::crypto::sig::SigningKey;
use crate::error::Error;
use crate::group_state::{GroupState, WelcomeInfo};
use crate::handshake::{GroupAdd, GroupOperation, GroupUpdate, UserInitKey, Welcome, SUPPORTED_VERSION};
use crate::keystore::Keystore;
use crate::messages::{self, MLSCiphertext, MLSPlaintext, MLSSenderData, PlaintextContent};
use crate::wire::{Codec, Message, Reader};

/// The four callbacks the core depends on to hand inbound events back to an application (spec
/// §4.9). Implementations choose their own representation; the core never does more than call
/// these four methods.
pub trait Handler<'k> {
    fn on_application_message(&mut self, application_data: &[u8], group_id: &[u8]);
    fn on_group_welcome(&mut self, session: &Session<'k>);
    fn on_group_member_added(&mut self, group_id: &[u8]);
    fn on_keys_updated(&mut self, group_id: &[u8]);
}

/// One participant's view of a group: a `GroupState`, a `Keystore` reference it consults to add
/// members and recognize its own private keys, and the (possibly still-unknown) position of this
/// participant's own leaf in the tree.
pub struct Session<'k> {
    state: GroupState,
    keystore: &'k dyn Keystore,
    user_name: String,
    own_leaf_index: Option<u32>,
}

impl<'k> Session<'k> {
    /// Starts a brand-new, single-member group, owned entirely by this participant.
    pub fn from_empty(
        cs: &'static CipherSuite,
        keystore: &'k dyn Keystore,
        user_name: &str,
        group_id: Vec<u8>,
        identity_key: SigningKey,
        credential: Credential,
        rng: &mut dyn CryptoRng,
    ) -> Result<Session<'k>, Error> {
        let state = GroupState::new_empty(cs, group_id, identity_key, credential, rng)?;
        Ok(Session {
            state,
            keystore,
            user_name: user_name.to_string(),
            own_leaf_index: Some(0),
        })
    }

    /// Reconstructs a `Session` from a decrypted `WelcomeInfo`. `own_leaf_index` is unknown until
    /// this participant processes the `Add` that names its own init key (see `process_message`).
    pub fn from_welcome(
        cs: &'static CipherSuite,
        keystore: &'k dyn Keystore,
        user_name: &str,
        welcome_info: WelcomeInfo,
        identity_key: SigningKey,
    ) -> Session<'k> {
        let state = GroupState::from_welcome_info(cs, welcome_info, identity_key, 0);
        Session {
            state,
            keystore,
            user_name: user_name.to_string(),
            own_leaf_index: None,
        }
    }

    /// Adds `user_name` to the group (spec §4.5): fetches their published init key from the
    /// keystore, builds the `WelcomeInfo` for them and a signed `Add` handshake for the rest of
    /// the group. Fails with `Error::UnknownInitKey` if the keystore has nothing on file.
    ///
    /// The returned `WelcomeInfo` still needs to be sealed with `seal_welcome` before it is safe
    /// to hand to the joiner; the returned `MLSCiphertext` is broadcast to the existing
    /// membership (and fed back through `process_message` by the adder itself, exactly like any
    /// other member, so everyone's tree stays in lockstep).
    pub fn add_member(&self, user_name: &str, rng: &mut dyn CryptoRng) -> Result<(WelcomeInfo, MLSCiphertext), Error> {
        let joiner_public_key = self.keystore.fetch_init_key(user_name).ok_or(Error::UnknownInitKey)?;

        // The adder never holds the joiner's own signing key, and this crate never verifies
        // UserInitKey signatures during processing (spec's own Non-goal) — signing under our own
        // identity key gives the field a structurally valid value without pretending to speak
        // for the joiner.
        let user_init_key = UserInitKey {
            user_init_key_id: user_name.as_bytes().to_vec(),
            supported_versions: vec![SUPPORTED_VERSION],
            cipher_suites: vec![self.state.cs],
            init_keys: vec![joiner_public_key],
            credential: Credential::new(user_name.as_bytes().to_vec()),
            signature: self.state.identity_key.sign(user_name.as_bytes()),
        };

        let (welcome_info, add) = self.state.add(user_init_key);
        let sender = self
            .own_leaf_index
            .ok_or(Error::MalformedMessage("own leaf index is not yet known".into()))?;
        let plaintext = messages::handshake_plaintext(self.state.cs, &self.state, sender, GroupOperation::Add(add));
        Ok((welcome_info, wrap_plaintext(&plaintext)?))
    }

    fn process_add(&mut self, add: &GroupAdd) -> Result<(), Error> {
        let init_key = add
            .init_key
            .init_keys
            .get(0)
            .ok_or(Error::MalformedMessage("UserInitKey has no keys".into()))?;
        let private_key = self.keystore.get_private_key(init_key);

        if private_key.is_some() {
            if self.own_leaf_index.is_some() {
                return Err(Error::MalformedMessage(
                    "already a member of this group; cannot also claim a second Add".into(),
                ));
            }
            self.own_leaf_index = Some(add.index);
            self.state.roster_index = add.index;
        }

        self.state.process_add(add, private_key)
    }

    /// Generates fresh entropy for our own leaf and frames it as an `MLSCiphertext` (spec §4.6).
    /// Resequencing note (spec §5/§9): the new leaf secret is installed immediately, exactly as
    /// `original_source`'s `update()` does — if this message is reordered behind another
    /// operation before it reaches the rest of the group, our own view diverges from theirs until
    /// a further `Update` resynchronizes it. This crate does not bundle the prior leaf secret into
    /// the message to recover automatically; see DESIGN.md.
    pub fn update(&mut self, rng: &mut dyn CryptoRng) -> Result<MLSCiphertext, Error> {
        let member_index = self
            .own_leaf_index
            .ok_or(Error::MalformedMessage("own leaf index is not yet known".into()))?;
        let update = self.state.update(2 * member_index as usize, rng)?;
        let plaintext = messages::handshake_plaintext(self.state.cs, &self.state, member_index, GroupOperation::Update(update));
        wrap_plaintext(&plaintext)
    }

    fn process_update(&mut self, sender_member_index: u32, update: &GroupUpdate) -> Result<(), Error> {
        let sender_tree_idx = 2 * sender_member_index as usize;
        let receiver_tree_idx = self.own_leaf_index.map(|i| 2 * i as usize).unwrap_or(sender_tree_idx);
        self.state.process_update(sender_tree_idx, receiver_tree_idx, update)
    }

    /// Frames an application payload as an `MLSCiphertext` (spec §4.8). No AEAD is applied yet:
    /// the "ciphertext" carries the packed plaintext verbatim, so a real cipher can be dropped in
    /// later without touching the framing shape.
    pub fn encrypt_application_message(&self, message: &[u8]) -> Result<MLSCiphertext, Error> {
        let sender = self
            .own_leaf_index
            .ok_or(Error::MalformedMessage("own leaf index is not yet known".into()))?;
        let plaintext = MLSPlaintext {
            group_id: self.state.context.group_id.clone(),
            epoch: self.state.epoch,
            sender,
            content: PlaintextContent::Application(message.to_vec()),
        };
        wrap_plaintext(&plaintext)
    }

    /// Unwraps `message`, checks its framing metadata against the decrypted plaintext, and
    /// dispatches to the internal `process_add`/`process_update` or to
    /// `handler.on_application_message` (spec §4.8). `Init` and `Remove` operations are rejected:
    /// wire-compatible, but out of scope for processing (spec's Open Question resolution).
    pub fn process_message(&mut self, message: &MLSCiphertext, handler: &mut dyn Handler<'k>) -> Result<(), Error> {
        let plaintext = MLSPlaintext::from_bytes(&message.ciphertext)?;
        if !message.verify_metadata(&plaintext) {
            return Err(Error::MalformedMessage(
                "ciphertext envelope metadata does not match its plaintext".into(),
            ));
        }

        match plaintext.content {
            PlaintextContent::Handshake(ref handshake) => {
                self.process_handshake(&plaintext.group_id, &handshake.operation, handshake.signer_index, handler)
            }
            PlaintextContent::Application(ref payload) => {
                handler.on_application_message(payload, &plaintext.group_id);
                Ok(())
            }
        }
    }

    fn process_handshake(
        &mut self,
        group_id: &[u8],
        operation: &GroupOperation,
        signer_index: u32,
        handler: &mut dyn Handler<'k>,
    ) -> Result<(), Error> {
        match operation {
            GroupOperation::Add(add) => {
                self.process_add(add)?;
                handler.on_group_member_added(group_id);
                Ok(())
            }
            GroupOperation::Update(update) => {
                self.process_update(signer_index, update)?;
                handler.on_keys_updated(group_id);
                Ok(())
            }
            GroupOperation::Init(_) | GroupOperation::Remove(_) => Err(Error::MalformedMessage(
                "this implementation does not process Init or Remove operations".into(),
            )),
        }
    }

    /// Reads just the `group_id` out of a packed `MLSCiphertext`, without fully decoding it.
    pub fn get_groupid_from_cipher(data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(MLSCiphertext::from_bytes(data)?.group_id)
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn own_leaf_index(&self) -> Option<u32> {
        self.own_leaf_index
    }

    pub fn group_id(&self) -> &[u8] {
        &self.state.context.group_id
    }

    pub fn epoch(&self) -> u32 {
        self.state.epoch
    }

    pub fn tree_hash(&self) -> &[u8] {
        &self.state.context.tree_hash
    }

    pub fn application_secret(&self) -> &[u8] {
        &self.state.epoch_secrets.application_secret
    }

    /// The number of array slots in the ratchet tree, i.e. `2L - 1` for `L` leaves.
    pub fn tree_size(&self) -> usize {
        self.state.tree.size()
    }

    /// The public key at tree-array index `node_idx`, or `None` if the node is blank or out of
    /// range.
    pub fn node_public_key(&self, node_idx: usize) -> Option<DhPublicKey> {
        self.state.tree.get(node_idx).and_then(|n| n.get_public_key()).copied()
    }
}

/// Wraps `plaintext` in an `MLSCiphertext` envelope (spec §4.8): the sender data is packed, not
/// AEAD-sealed, and the "ciphertext" is the packed plaintext itself.
fn wrap_plaintext(plaintext: &MLSPlaintext) -> Result<MLSCiphertext, Error> {
    let sender_data = MLSSenderData {
        sender: plaintext.sender,
        generation: 0,
    };
    let mut encrypted_sender_data = Vec::new();
    sender_data.encode(&mut encrypted_sender_data);

    Ok(MLSCiphertext {
        group_id: plaintext.group_id.clone(),
        epoch: plaintext.epoch,
        content_type: plaintext.content_type(),
        sender_data_nonce: Vec::new(),
        encrypted_sender_data,
        ciphertext: plaintext.pack()?,
    })
}

/// ECIES-encrypts a packed `WelcomeInfo` to the joiner's init key (teacher's `handshake::Welcome`
/// envelope, layered on top of spec's literal plaintext `(WelcomeInfo, Add)` API).
pub fn seal_welcome(
    cs: &'static CipherSuite,
    welcome_info: &WelcomeInfo,
    user_init_key_id: Vec<u8>,
    joiner_public_key: &DhPublicKey,
    rng: &mut dyn CryptoRng,
) -> Result<Welcome, Error> {
    let mut packed = Vec::new();
    welcome_info.encode(&mut packed);
    let encrypted_welcome_info = ecies::ecies_encrypt(cs, joiner_public_key, &packed, rng)?;
    Ok(Welcome {
        user_init_key_id,
        cipher_suite: cs,
        encrypted_welcome_info,
    })
}

/// Inverse of `seal_welcome`: decrypts a `Welcome` envelope back into the `WelcomeInfo` it carries.
pub fn open_welcome(welcome: &Welcome, joiner_private_key: &DhPrivateKey) -> Result<WelcomeInfo, Error> {
    let packed = ecies::ecies_decrypt(welcome.cipher_suite, joiner_private_key, &welcome.encrypted_welcome_info)?;
    WelcomeInfo::decode(&mut Reader::new(&packed))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ciphersuite::X25519_SHA256_AES128GCM;
    use crate::keystore::MemoryKeystore;
    use rand::rngs::OsRng;

    struct RecordingHandler {
        applications: Vec<Vec<u8>>,
        members_added: u32,
        keys_updated: u32,
    }

    impl RecordingHandler {
        fn new() -> RecordingHandler {
            RecordingHandler {
                applications: Vec::new(),
                members_added: 0,
                keys_updated: 0,
            }
        }
    }

    impl<'k> Handler<'k> for RecordingHandler {
        fn on_application_message(&mut self, application_data: &[u8], _group_id: &[u8]) {
            self.applications.push(application_data.to_vec());
        }
        fn on_group_welcome(&mut self, _session: &Session<'k>) {}
        fn on_group_member_added(&mut self, _group_id: &[u8]) {
            self.members_added += 1;
        }
        fn on_keys_updated(&mut self, _group_id: &[u8]) {
            self.keys_updated += 1;
        }
    }

    fn register(keystore: &MemoryKeystore, user_name: &str, seed: u8) -> DhPublicKey {
        let sk = DhPrivateKey::from_bytes(&[seed; 32]).unwrap();
        let pk = sk.derive_public();
        keystore.register_keypair(user_name, pk, sk);
        pk
    }

    #[test]
    fn two_member_creation_converges() {
        let cs: &'static CipherSuite = &X25519_SHA256_AES128GCM;
        let alice_keystore = MemoryKeystore::new();
        let bob_keystore = MemoryKeystore::new();

        register(&alice_keystore, "alice", 1);
        let bob_public = register(&bob_keystore, "bob", 2);
        alice_keystore.register_keypair("bob", bob_public, DhPrivateKey::from_bytes(&[2u8; 32]).unwrap());

        let mut alice = Session::from_empty(
            cs,
            &alice_keystore,
            "alice",
            b"test-group".to_vec(),
            SigningKey::generate(&mut OsRng),
            Credential::new(b"alice".to_vec()),
            &mut OsRng,
        )
        .unwrap();

        let (welcome_info, add_message) = alice.add_member("bob", &mut OsRng).unwrap();
        let mut bob = Session::from_welcome(cs, &bob_keystore, "bob", welcome_info, SigningKey::generate(&mut OsRng));

        let mut handler = RecordingHandler::new();
        alice.process_message(&add_message, &mut handler).unwrap();
        bob.process_message(&add_message, &mut handler).unwrap();

        assert_eq!(handler.members_added, 2);
        assert_eq!(alice.tree_size(), 3);
        assert_eq!(bob.tree_size(), 3);
        assert_eq!(bob.own_leaf_index(), Some(1));
        assert_eq!(alice.tree_hash(), bob.tree_hash());
        assert_eq!(alice.application_secret(), bob.application_secret());
        assert!(alice.node_public_key(1).is_none());
        assert!(alice.node_public_key(0).is_some());
        assert!(alice.node_public_key(2).is_some());
    }

    #[test]
    fn application_message_round_trips_through_processing() {
        let cs: &'static CipherSuite = &X25519_SHA256_AES128GCM;
        let keystore = MemoryKeystore::new();
        let mut alice = Session::from_empty(
            cs,
            &keystore,
            "alice",
            b"solo-group".to_vec(),
            SigningKey::generate(&mut OsRng),
            Credential::new(b"alice".to_vec()),
            &mut OsRng,
        )
        .unwrap();

        let ciphertext = alice.encrypt_application_message(b"hello group").unwrap();
        let mut handler = RecordingHandler::new();
        alice.process_message(&ciphertext, &mut handler).unwrap();

        assert_eq!(handler.applications, vec![b"hello group".to_vec()]);
    }
}

//! The group state machine (spec §4.5/§4.6): `GroupContext` plus the
//! `GroupState` that owns the ratchet tree, key schedule, and transcript
//! hash, and knows how to turn `add`/`update` into wire messages and how to
//! apply their peer-sent counterparts. Grounded in
//! `original_source/libMLS/libMLS/state.py` and `group_context.py`.

use crate::credential::Credential;
use crate::crypto::ciphersuite::CipherSuite;
use crate::crypto::dh::DhPrivateKey;
use crate::crypto::rng::CryptoRng;
use crate::crypto::sig::SigningKey;
use crate::error::Error;
use crate::handshake::{DirectPathMessage, DirectPathNodeMessage, GroupAdd, GroupUpdate, UserInitKey};
use crate::key_schedule::KeySchedule;
use crate::ratchet_tree::{RatchetTree, RatchetTreeNode};
use crate::tree_math;
use crate::wire::{Codec, Reader};

/// `struct { opaque group_id<0..255>; uint32 epoch; opaque tree_hash<0..255>; opaque
/// confirmed_transcript_hash<0..255>; } GroupContext;` (spec §4.5).
#[derive(Clone, Debug)]
pub(crate) struct GroupContext {
    pub(crate) group_id: Vec<u8>,
    pub(crate) epoch: u32,
    pub(crate) tree_hash: Vec<u8>,
    pub(crate) confirmed_transcript_hash: Vec<u8>,
}

impl Codec for GroupContext {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.group_id);
        crate::wire::write_u32(buf, self.epoch);
        crate::wire::write_vec(buf, &self.tree_hash);
        crate::wire::write_vec(buf, &self.confirmed_transcript_hash);
    }

    fn decode(r: &mut Reader) -> Result<GroupContext, Error> {
        let group_id = r.read_vec()?;
        let epoch = r.read_u32()?;
        let tree_hash = r.read_vec()?;
        let confirmed_transcript_hash = r.read_vec()?;
        Ok(GroupContext {
            group_id,
            epoch,
            tree_hash,
            confirmed_transcript_hash,
        })
    }
}

/// Everything a brand-new member needs to reconstruct the group's current state, sent encrypted
/// inside a `Welcome` (spec §4.5).
#[derive(Debug)]
pub struct WelcomeInfo {
    pub(crate) group_id: Vec<u8>,
    pub(crate) epoch: u32,
    pub(crate) tree: RatchetTree,
    pub(crate) interim_transcript_hash: Vec<u8>,
    pub(crate) init_secret: Vec<u8>,
}

impl Codec for WelcomeInfo {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_vec(buf, &self.group_id);
        crate::wire::write_u32(buf, self.epoch);
        self.tree.encode(buf);
        crate::wire::write_vec(buf, &self.interim_transcript_hash);
        crate::wire::write_vec(buf, &self.init_secret);
    }

    fn decode(r: &mut Reader) -> Result<WelcomeInfo, Error> {
        let group_id = r.read_vec()?;
        let epoch = r.read_u32()?;
        let tree = RatchetTree::decode(r)?;
        let interim_transcript_hash = r.read_vec()?;
        let init_secret = r.read_vec()?;
        Ok(WelcomeInfo {
            group_id,
            epoch,
            tree,
            interim_transcript_hash,
            init_secret,
        })
    }
}

/// The live state of one group membership: its ratchet tree, the running key schedule, and the
/// transcript hash every `Handshake` signs over.
pub(crate) struct GroupState {
    pub(crate) cs: &'static CipherSuite,
    pub(crate) context: GroupContext,
    pub(crate) tree: RatchetTree,
    pub(crate) epoch_secrets: KeySchedule,
    pub(crate) identity_key: SigningKey,
    pub(crate) roster_index: u32,
    pub(crate) transcript_hash: Vec<u8>,
    pub(crate) epoch: u32,
}

impl GroupState {
    /// Starts a brand-new, single-member group.
    pub(crate) fn new_empty(
        cs: &'static CipherSuite,
        group_id: Vec<u8>,
        identity_key: SigningKey,
        credential: Credential,
        rng: &mut dyn CryptoRng,
    ) -> Result<GroupState, Error> {
        let mut tree = RatchetTree::new();
        tree.add_leaf_node(RatchetTreeNode::Blank);

        let mut leaf_secret = vec![0u8; 32];
        rng.fill_bytes(&mut leaf_secret);
        tree.propogate_new_path_secret(cs, leaf_secret, 0)?;
        tree.nodes[0].update_credential(credential);

        let context = GroupContext {
            group_id,
            epoch: 0,
            tree_hash: tree.tree_hash(cs),
            confirmed_transcript_hash: Vec::new(),
        };

        Ok(GroupState {
            cs,
            context,
            tree,
            epoch_secrets: KeySchedule::new(cs),
            identity_key,
            roster_index: 0,
            transcript_hash: Vec::new(),
            epoch: 0,
        })
    }

    /// Reconstructs a `GroupState` from a peer-sent `WelcomeInfo`.
    pub(crate) fn from_welcome_info(
        cs: &'static CipherSuite,
        welcome_info: WelcomeInfo,
        identity_key: SigningKey,
        roster_index: u32,
    ) -> GroupState {
        let context = GroupContext {
            group_id: welcome_info.group_id,
            epoch: welcome_info.epoch,
            tree_hash: welcome_info.tree.tree_hash(cs),
            confirmed_transcript_hash: welcome_info.interim_transcript_hash.clone(),
        };

        // Pick up the founder's key schedule exactly where it was at this epoch: `init_secret`
        // must match byte-for-byte, not be re-derived through another `update()`, or the next
        // `advance_epoch` (same `update_secret`, different HKDF-Extract salt on each side) would
        // diverge the two sides' epoch secrets permanently.
        let epoch_secrets = KeySchedule::from_init_secret(cs, &welcome_info.init_secret);

        GroupState {
            cs,
            context,
            tree: welcome_info.tree,
            epoch_secrets,
            identity_key,
            roster_index,
            transcript_hash: welcome_info.interim_transcript_hash,
            epoch: welcome_info.epoch,
        }
    }

    fn encoded_context(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.context.encode(&mut buf);
        buf
    }

    /// Re-derives the epoch's secrets after the tree (and therefore `tree_hash`) has changed,
    /// mixing in `update_secret` as this epoch's fresh entropy.
    fn advance_epoch(&mut self, update_secret: &[u8]) {
        self.epoch += 1;
        self.context.epoch = self.epoch;
        self.context.tree_hash = self.tree.tree_hash(self.cs);
        let encoded_context = self.encoded_context();
        self.epoch_secrets.update(update_secret, &encoded_context);
    }

    /// Builds a `(WelcomeInfo, GroupAdd)` pair to bring a new member, identified by
    /// `user_init_key`, into the group.
    pub(crate) fn add(&self, user_init_key: UserInitKey) -> (WelcomeInfo, GroupAdd) {
        let welcome_info = WelcomeInfo {
            group_id: self.context.group_id.clone(),
            epoch: self.context.epoch,
            tree: self.tree.without_private_keys(),
            interim_transcript_hash: self.transcript_hash.clone(),
            init_secret: self.epoch_secrets.init_secret().to_vec(),
        };

        let add = GroupAdd {
            index: tree_math::num_leaves_in_tree(self.tree.size()) as u32,
            welcome_info_hash: self.cs.hash(&{
                let mut buf = Vec::new();
                welcome_info.encode(&mut buf);
                buf
            }),
            init_key: user_init_key,
        };

        (welcome_info, add)
    }

    /// Applies a peer's `GroupAdd`: installs the new leaf at `add.index` (extending the tree if
    /// it names the next free slot, or reusing an existing blank leaf otherwise), blanks the new
    /// leaf's direct path (spec §3 invariant (ii)), and advances the epoch. If `private_key` is
    /// `Some` (the caller owns the matching init key — i.e. this Add names *us*), it is installed
    /// on the new leaf so future `process_update`s addressed to our resolution can be decrypted.
    pub(crate) fn process_add(&mut self, add: &GroupAdd, private_key: Option<DhPrivateKey>) -> Result<(), Error> {
        let init_key = add
            .init_key
            .init_keys
            .get(0)
            .ok_or(Error::MalformedMessage("UserInitKey has no keys".into()))?;

        let num_leaves = tree_math::num_leaves_in_tree(self.tree.size());
        let index = add.index as usize;

        if index < num_leaves {
            let leaf_node_idx = 2 * index;
            let existing = self
                .tree
                .get(leaf_node_idx)
                .ok_or(Error::MalformedMessage("Add.index names a leaf outside the tree".into()))?;
            if existing.get_public_key().is_some() {
                return Err(Error::MalformedMessage("Add.index names a non-blank leaf".into()));
            }
        } else if index == num_leaves {
            self.tree.add_leaf_node(RatchetTreeNode::Blank);
        } else {
            return Err(Error::MalformedMessage("Add.index is beyond the tree's next free leaf".into()));
        }

        let leaf_node_idx = 2 * index;
        self.tree.propogate_blank(leaf_node_idx);

        let leaf = self
            .tree
            .get_mut(leaf_node_idx)
            .expect("leaf index was just validated or extended into the tree");
        leaf.update_public_key(init_key.clone());
        leaf.update_credential(add.init_key.credential.clone());
        if let Some(private_key) = private_key {
            leaf.update_private_key(private_key);
        }

        let update_secret = vec![0u8; self.cs.hash_length()];
        self.advance_epoch(&update_secret);
        Ok(())
    }

    /// Generates fresh entropy for `leaf_index`'s direct path, re-keying every ancestor, and
    /// returns the `GroupUpdate` that communicates the new public keys (and the encrypted path
    /// secrets) to the rest of the group.
    pub(crate) fn update(
        &mut self,
        leaf_index: usize,
        rng: &mut dyn CryptoRng,
    ) -> Result<GroupUpdate, Error> {
        let mut leaf_secret = vec![0u8; self.cs.hash_length()];
        rng.fill_bytes(&mut leaf_secret);

        let update_secret = self.tree.propogate_new_path_secret(self.cs, leaf_secret, leaf_index)?;
        let path = self.tree.encrypt_direct_path_secrets(self.cs, leaf_index, rng)?;

        self.advance_epoch(&update_secret);
        Ok(GroupUpdate { path })
    }

    /// Applies a peer's `GroupUpdate`: re-derives `leaf_index`'s direct path from the decrypted
    /// path secret. The tree is mutated on a scratch copy first (spec §9 DESIGN NOTES: updates
    /// apply atomically, all-or-nothing), and only swapped in once every step has succeeded.
    pub(crate) fn process_update(
        &mut self,
        sender_leaf_index: usize,
        receiver_leaf_index: usize,
        update: &GroupUpdate,
    ) -> Result<(), Error> {
        let num_leaves = tree_math::num_leaves_in_tree(self.tree.size());
        // leaf + direct_path (which excludes both leaf and root) + root
        let expected_path_len = tree_math::node_direct_path(sender_leaf_index, num_leaves).len() + 2;
        if update.path.node_messages.len() != expected_path_len {
            return Err(Error::TreeError("GroupUpdate path length does not match tree depth"));
        }
        if !update.path.node_messages[0].node_secrets.is_empty() {
            return Err(Error::MalformedMessage(
                "GroupUpdate's leading (leaf) node carries ciphertexts".into(),
            ));
        }

        let mut staged = self.tree.clone();
        apply_direct_path_public_keys(&mut staged, sender_leaf_index, &update.path)?;

        if sender_leaf_index != receiver_leaf_index {
            let (path_secret, common_ancestor_idx) =
                self.tree.decrypt_direct_path_message(self.cs, &update.path, sender_leaf_index, receiver_leaf_index)?;

            let claimed_public_key = staged
                .get(common_ancestor_idx)
                .and_then(|n| n.get_public_key())
                .cloned();
            let rederived_secret = staged.propogate_new_path_secret(self.cs, path_secret.clone(), common_ancestor_idx)?;
            let rederived_public_key = staged.get(common_ancestor_idx).and_then(|n| n.get_public_key()).cloned();
            if claimed_public_key != rederived_public_key {
                return Err(Error::CryptoKeyMismatch);
            }

            self.tree = staged;
            self.advance_epoch(&rederived_secret);
        } else {
            self.tree = staged;
            let update_secret = vec![0u8; self.cs.hash_length()];
            self.advance_epoch(&update_secret);
        }

        Ok(())
    }
}

/// Overwrites every node on `sender_leaf_index`'s direct path (leaf through root) with the public
/// keys carried in `path`, without touching any private key material. Used as the first,
/// always-safe half of `process_update`; decrypting our own path secret, if we can, happens
/// afterward.
///
/// `path.node_messages` is `[leaf] ++ direct_path[1:] ++ [root]`, mirroring the index sequence
/// `RatchetTree::encrypt_direct_path_secrets` walks: entry 0 is the sender's own leaf, and each
/// subsequent entry is the parent of the previous direct-path node.
fn apply_direct_path_public_keys(
    tree: &mut RatchetTree,
    sender_leaf_index: usize,
    path: &DirectPathMessage,
) -> Result<(), Error> {
    let num_leaves = tree_math::num_leaves_in_tree(tree.size());
    let direct_path = tree_math::node_direct_path(sender_leaf_index, num_leaves);

    let mut node_indices = vec![sender_leaf_index];
    node_indices.extend_from_slice(&direct_path);
    node_indices.push(tree_math::root_idx(num_leaves));

    for (node_idx, node_msg) in node_indices.into_iter().zip(path.node_messages.iter()) {
        set_public_key(tree, node_idx, node_msg)?;
    }
    Ok(())
}

fn set_public_key(tree: &mut RatchetTree, idx: usize, msg: &DirectPathNodeMessage) -> Result<(), Error> {
    let node = tree.get_mut(idx).ok_or(Error::TreeError("direct path index out of range"))?;
    node.update_public_key(msg.public_key.clone());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ciphersuite::X25519_SHA256_AES128GCM;
    use crate::crypto::dh::DhPrivateKey;
    use rand::rngs::OsRng;

    fn new_state() -> GroupState {
        let cs = &X25519_SHA256_AES128GCM;
        let identity_key = SigningKey::generate(&mut OsRng);
        let credential = Credential::new(b"alice".to_vec());
        GroupState::new_empty(cs, b"test-group".to_vec(), identity_key, credential, &mut OsRng).unwrap()
    }

    #[test]
    fn new_empty_group_has_one_leaf() {
        let state = new_state();
        assert_eq!(state.tree.size(), 1);
        assert_eq!(state.epoch, 0);
    }

    /// A joiner reconstructed from a `WelcomeInfo` must start with the exact same `init_secret`
    /// the founder held at that epoch, not a re-derived one — otherwise the two sides' very next
    /// `advance_epoch` uses different HKDF-Extract salts and their key schedules diverge forever.
    #[test]
    fn joiner_init_secret_matches_founders_at_the_welcomed_epoch() {
        let founder = new_state();
        let welcome_info = WelcomeInfo {
            group_id: founder.context.group_id.clone(),
            epoch: founder.context.epoch,
            tree: founder.tree.without_private_keys(),
            interim_transcript_hash: founder.transcript_hash.clone(),
            init_secret: founder.epoch_secrets.init_secret().to_vec(),
        };

        let joiner = GroupState::from_welcome_info(
            founder.cs,
            welcome_info,
            SigningKey::generate(&mut OsRng),
            0,
        );

        assert_eq!(joiner.epoch_secrets.init_secret(), founder.epoch_secrets.init_secret());
    }

    #[test]
    fn update_advances_the_epoch() {
        let mut state = new_state();
        let before_epoch = state.epoch;
        let _update = state.update(0, &mut OsRng).unwrap();
        assert_eq!(state.epoch, before_epoch + 1);
    }

    #[test]
    fn process_add_grows_the_tree() {
        let mut state = new_state();
        let signing_key = SigningKey::generate(&mut OsRng);
        let new_member_dh = DhPrivateKey::from_bytes(&[9u8; 32]).unwrap().derive_public();

        let init_key = UserInitKeyFixture::new(new_member_dh, signing_key);
        let (_, add) = state.add(init_key);
        state.process_add(&add, None).unwrap();

        assert_eq!(state.tree.size(), 3);
    }

    struct UserInitKeyFixture;
    impl UserInitKeyFixture {
        fn new(dh_key: crate::crypto::dh::DhPublicKey, signing_key: SigningKey) -> UserInitKey {
            UserInitKey {
                user_init_key_id: b"fixture".to_vec(),
                supported_versions: vec![crate::handshake::SUPPORTED_VERSION],
                cipher_suites: vec![&X25519_SHA256_AES128GCM],
                init_keys: vec![dh_key],
                credential: Credential::new(b"bob".to_vec()),
                signature: signing_key.sign(b"fixture"),
            }
        }
    }

    /// spec §8 scenario 2: a two-member group's `Update` has a `DirectPath` of length 2 — the
    /// sender's own leaf (no ciphertexts) and the root (exactly one ciphertext, since the only
    /// other member is the sole node in the root's copath's resolution) — and the recipient
    /// converges to the same node 0/node 1 keys and tree hash as the sender.
    #[test]
    fn two_member_update_has_expected_direct_path_shape_and_converges() {
        let mut alice = new_state();
        let bob_dh = DhPrivateKey::from_bytes(&[11u8; 32]).unwrap();
        let bob_signing_key = SigningKey::generate(&mut OsRng);
        let init_key = UserInitKeyFixture::new(bob_dh.derive_public(), bob_signing_key);

        let (_, add) = alice.add(init_key);
        alice.process_add(&add, None).unwrap();

        let mut bob = GroupState {
            cs: alice.cs,
            context: alice.context.clone(),
            tree: alice.tree.clone(),
            epoch_secrets: alice.epoch_secrets.clone(),
            identity_key: SigningKey::generate(&mut OsRng),
            roster_index: 1,
            transcript_hash: alice.transcript_hash.clone(),
            epoch: alice.epoch,
        };
        bob.tree.get_mut(2).unwrap().update_private_key(bob_dh);

        let update = alice.update(0, &mut OsRng).unwrap();
        assert_eq!(update.path.node_messages.len(), 2);
        assert!(update.path.node_messages[0].node_secrets.is_empty());
        assert_eq!(update.path.node_messages[1].node_secrets.len(), 1);

        bob.process_update(0, 2, &update).unwrap();

        assert_eq!(alice.tree.get(0).unwrap().get_public_key(), bob.tree.get(0).unwrap().get_public_key());
        assert_eq!(alice.tree.get(1).unwrap().get_public_key(), bob.tree.get(1).unwrap().get_public_key());
        assert_eq!(
            alice.tree.get(1).unwrap().get_private_key().map(|k| *k.as_bytes()),
            bob.tree.get(1).unwrap().get_private_key().map(|k| *k.as_bytes())
        );
        assert!(bob.tree.get(0).unwrap().get_private_key().is_none());
        assert_eq!(alice.tree.tree_hash(alice.cs), bob.tree.tree_hash(bob.cs));
    }
}

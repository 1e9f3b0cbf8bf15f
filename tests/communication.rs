//! Integration tests playing out the seed scenarios of spec §8 end-to-end
//! through the public `Session` façade, mirroring
//! `original_source/libMLS/libMLS/tests/test_communication.py`
//! (`test_create_session_with_many_members`, `test_update_message`,
//! `test_double_update`) but carried further: fan-out to N members, an
//! Update after fan-out, and an Add after that Update, checking every
//! member's tree and key schedule converge at each step.

use rand::rngs::OsRng;

use ratchet_mls::{
    Credential, DhPrivateKey, Handler, Keystore, MemoryKeystore, Session, SigningKey, X25519_SHA256_AES128GCM,
};

/// A `Handler` that does nothing; these tests only care about the resulting
/// `Session` state, not about the callbacks firing.
struct NullHandler;

impl<'k> Handler<'k> for NullHandler {
    fn on_application_message(&mut self, _application_data: &[u8], _group_id: &[u8]) {}
    fn on_group_welcome(&mut self, _session: &Session<'k>) {}
    fn on_group_member_added(&mut self, _group_id: &[u8]) {}
    fn on_keys_updated(&mut self, _group_id: &[u8]) {}
}

/// Publishes a fresh DH init key for `name` in `keystore`, as if that member had generated and
/// published a `UserInitKey` ahead of being invited.
fn publish_init_key(keystore: &MemoryKeystore, name: &str, seed: u8) {
    let sk = DhPrivateKey::from_bytes(&[seed; 32]).unwrap();
    let pk = sk.derive_public();
    keystore.register_keypair(name, pk, sk);
}

/// Asserts that every session in `sessions` has converged to the same tree shape, tree hash,
/// epoch, and application secret (spec §8's "hash agreement" invariant).
fn assert_converged(sessions: &[Session<'_>]) {
    let first = &sessions[0];
    for other in &sessions[1..] {
        assert_eq!(other.tree_size(), first.tree_size());
        assert_eq!(other.epoch(), first.epoch());
        assert_eq!(other.tree_hash(), first.tree_hash());
        assert_eq!(other.application_secret(), first.application_secret());
        for idx in 0..first.tree_size() {
            assert_eq!(other.node_public_key(idx), first.node_public_key(idx), "node {} diverged", idx);
        }
    }
}

/// Builds a group of `num_members` members (spec §8 scenario 3): start with leaf 0, then
/// sequentially add members 1..num_members, with every existing member (including the adder) and
/// the new joiner processing the resulting `Add`.
fn build_fanout(num_members: usize) -> (Vec<Session<'static>>, &'static MemoryKeystore) {
    // Leaked so the keystore outlives every `Session` built against it, for this helper's
    // 'static convenience; production callers own the keystore for the Session's lifetime instead.
    let keystore: &'static MemoryKeystore = Box::leak(Box::new(MemoryKeystore::new()));
    let names = [
        "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy", "mallory",
    ];
    assert!(num_members - 1 <= names.len(), "not enough fixture names for {} members", num_members);

    let mut rng = OsRng;
    let mut handler = NullHandler;

    let alice = Session::from_empty(
        &X25519_SHA256_AES128GCM,
        keystore,
        "alice",
        b"fanout-group".to_vec(),
        SigningKey::generate(&mut rng),
        Credential::new(b"alice".to_vec()),
        &mut rng,
    )
    .unwrap();
    let mut sessions = vec![alice];

    for (i, name) in names.iter().take(num_members - 1).enumerate() {
        publish_init_key(keystore, name, (i + 1) as u8);

        let (welcome_info, add_message) = sessions[0].add_member(name, &mut rng).unwrap();
        let mut joiner = Session::from_welcome(
            &X25519_SHA256_AES128GCM,
            keystore,
            name,
            welcome_info,
            SigningKey::generate(&mut rng),
        );

        for session in sessions.iter_mut() {
            session.process_message(&add_message, &mut handler).unwrap();
        }
        joiner.process_message(&add_message, &mut handler).unwrap();

        sessions.push(joiner);
    }

    (sessions, keystore)
}

#[test]
fn many_member_fanout_converges() {
    for num_members in 3..=9 {
        let (sessions, _keystore) = build_fanout(num_members);
        assert_eq!(sessions.len(), num_members);
        assert_eq!(sessions[0].tree_size(), 2 * num_members - 1);
        assert_converged(&sessions);
    }
}

#[test]
fn update_after_many_member_fanout_converges() {
    let (mut sessions, _keystore) = build_fanout(7);
    let mut handler = NullHandler;

    let update_message = sessions[0].update(&mut OsRng).unwrap();
    let epoch_before = sessions[0].epoch();

    for session in sessions.iter_mut().skip(1) {
        session.process_message(&update_message, &mut handler).unwrap();
    }

    assert_eq!(sessions[0].epoch(), epoch_before);
    assert_converged(&sessions);
}

#[test]
fn add_after_update_converges_for_everyone_including_the_newcomer() {
    let (mut sessions, keystore) = build_fanout(7);
    let mut handler = NullHandler;
    let mut rng = OsRng;

    let update_message = sessions[0].update(&mut rng).unwrap();
    for session in sessions.iter_mut().skip(1) {
        session.process_message(&update_message, &mut handler).unwrap();
    }
    assert_converged(&sessions);

    // A brand-new user joins via the *last* member, not the founder, so the Add's sender is not
    // node 0 (spec §8 scenario 5).
    publish_init_key(keystore, "alice2", 200);

    let adder_idx = sessions.len() - 1;
    let (welcome_info, add_message) = sessions[adder_idx].add_member("alice2", &mut rng).unwrap();
    let mut newcomer = Session::from_welcome(
        &X25519_SHA256_AES128GCM,
        keystore,
        "alice2",
        welcome_info,
        SigningKey::generate(&mut rng),
    );

    for session in sessions.iter_mut() {
        session.process_message(&add_message, &mut handler).unwrap();
    }
    newcomer.process_message(&add_message, &mut handler).unwrap();
    sessions.push(newcomer);

    assert_eq!(sessions.last().unwrap().own_leaf_index(), Some(7));
    assert_converged(&sessions);
}

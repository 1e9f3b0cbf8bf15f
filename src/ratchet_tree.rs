use crate::{
    credential::Credential,
    crypto::{
        ciphersuite::CipherSuite,
        dh::{DhPrivateKey, DhPublicKey},
        ecies, hkdf,
        rng::CryptoRng,
    },
    error::Error,
    handshake::{DirectPathMessage, DirectPathNodeMessage},
    tree_math,
    wire::{Codec, Reader},
};

// Ratchet trees are serialized as a u32-length-prefixed list of RatchetTreeNode, and a
// RatchetTreeNode is encoded the same way an Option<(DhPublicKey, Option<Credential>)> would be:
// a presence byte followed by the payload when present.

/// A node in a `RatchetTree`. Every node must have a DH pubkey. It may also optionally contain the
/// corresponding private key, a cached secret octet string, and (for leaves) the member's
/// `Credential`.
#[derive(Clone, Debug)]
pub(crate) enum RatchetTreeNode {
    Blank,
    Filled {
        public_key: DhPublicKey,
        credential: Option<Credential>,
        private_key: Option<DhPrivateKey>,
        secret: Option<Vec<u8>>,
    },
}

impl RatchetTreeNode {
    /// Returns `true` iff this is the `Filled` variant
    #[rustfmt::skip]
    fn is_filled(&self) -> bool {
        if let RatchetTreeNode::Filled { .. } = self {
            true
        } else {
            false
        }
    }

    /// Updates the node's public key to the given one. This is the only way to convert a `Blank`
    /// node into a `Filled` one.
    pub(crate) fn update_public_key(&mut self, new_public_key: DhPublicKey) {
        match self {
            &mut RatchetTreeNode::Blank => {
                *self = RatchetTreeNode::Filled {
                    public_key: new_public_key,
                    credential: None,
                    private_key: None,
                    secret: None,
                };
            }
            &mut RatchetTreeNode::Filled {
                ref mut public_key, ..
            } => *public_key = new_public_key,
        }
    }

    /// Returns a node's public key. If the node is `Blank`, returns `None`.
    pub(crate) fn get_public_key(&self) -> Option<&DhPublicKey> {
        match self {
            &RatchetTreeNode::Blank => None,
            &RatchetTreeNode::Filled { ref public_key, .. } => Some(public_key),
        }
    }

    /// Returns the member `Credential` attached to a leaf node, if any.
    pub(crate) fn get_credential(&self) -> Option<&Credential> {
        match self {
            &RatchetTreeNode::Blank => None,
            &RatchetTreeNode::Filled { ref credential, .. } => credential.as_ref(),
        }
    }

    /// Sets the `Credential` carried by a leaf node.
    ///
    /// Panics: If the node is `Blank`
    pub(crate) fn update_credential(&mut self, new_credential: Credential) {
        match self {
            &mut RatchetTreeNode::Blank => panic!("tried to set credential of blank node"),
            &mut RatchetTreeNode::Filled {
                ref mut credential, ..
            } => *credential = Some(new_credential),
        }
    }

    /// Updates the node's private key to the given one
    ///
    /// Panics: If the node is `Blank`
    pub(crate) fn update_private_key(&mut self, new_private_key: DhPrivateKey) {
        match self {
            &mut RatchetTreeNode::Blank => panic!("tried to update private key of blank node"),
            &mut RatchetTreeNode::Filled {
                ref mut private_key, ..
            } => {
                *private_key = Some(new_private_key);
            }
        }
    }

    /// Updates the node's secret to the given one
    ///
    /// Panics: If the node is `Blank`
    pub(crate) fn update_secret(&mut self, new_secret: Vec<u8>) {
        match self {
            &mut RatchetTreeNode::Blank => panic!("tried to update secret of blank node"),
            &mut RatchetTreeNode::Filled { ref mut secret, .. } => {
                *secret = Some(new_secret);
            }
        }
    }

    /// Returns a reference to the contained node secret. If no secret exists, `None` is returned.
    pub(crate) fn get_secret(&self) -> Option<&[u8]> {
        match self {
            &RatchetTreeNode::Blank => None,
            &RatchetTreeNode::Filled { ref secret, .. } => secret.as_ref().map(|v| v.as_slice()),
        }
    }

    /// Returns `Some(&private_key)` if the node contains a private key. Otherwise returns `None`.
    pub(crate) fn get_private_key(&self) -> Option<&DhPrivateKey> {
        match self {
            &RatchetTreeNode::Blank => None,
            &RatchetTreeNode::Filled { ref private_key, .. } => private_key.as_ref(),
        }
    }
}

impl Codec for RatchetTreeNode {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            RatchetTreeNode::Blank => crate::wire::write_u8(buf, 0),
            RatchetTreeNode::Filled {
                public_key,
                credential,
                ..
            } => {
                crate::wire::write_u8(buf, 1);
                public_key.encode(buf);
                match credential {
                    None => crate::wire::write_u8(buf, 0),
                    Some(cred) => {
                        crate::wire::write_u8(buf, 1);
                        cred.encode(buf);
                    }
                }
            }
        }
    }

    fn decode(r: &mut Reader) -> Result<RatchetTreeNode, Error> {
        match r.read_u8()? {
            0 => Ok(RatchetTreeNode::Blank),
            1 => {
                let public_key = DhPublicKey::decode(r)?;
                let credential = match r.read_u8()? {
                    0 => None,
                    1 => Some(Credential::decode(r)?),
                    _ => return Err(Error::MalformedMessage("invalid credential presence flag".into())),
                };
                Ok(RatchetTreeNode::Filled {
                    public_key,
                    credential,
                    private_key: None,
                    secret: None,
                })
            }
            _ => Err(Error::MalformedMessage("invalid ratchet tree node tag".into())),
        }
    }
}

/// A left-balanced binary tree of `RatchetTreeNode`s
#[derive(Clone, Debug)]
pub(crate) struct RatchetTree {
    pub(crate) nodes: Vec<RatchetTreeNode>,
}

impl Codec for RatchetTree {
    fn encode(&self, buf: &mut Vec<u8>) {
        crate::wire::write_list(buf, &self.nodes, |buf, node| node.encode(buf));
    }

    fn decode(r: &mut Reader) -> Result<RatchetTree, Error> {
        let nodes = r.read_list(RatchetTreeNode::decode)?;
        Ok(RatchetTree { nodes })
    }
}

impl crate::wire::Message for RatchetTree {}

impl RatchetTree {
    /// Returns an new empty `RatchetTree`
    pub fn new() -> RatchetTree {
        RatchetTree { nodes: Vec::new() }
    }

    /// Returns the number of nodes in the tree
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node at the given index
    pub fn get(&self, idx: usize) -> Option<&RatchetTreeNode> {
        self.nodes.get(idx)
    }

    /// Returns the root node. Returns `None` iff the tree is empty.
    pub fn get_root_node(&self) -> Option<&RatchetTreeNode> {
        if self.size() == 0 {
            None
        } else {
            let root_idx = tree_math::root_idx(tree_math::num_leaves_in_tree(self.size()));
            self.get(root_idx)
        }
    }

    /// Returns a mutable reference to the node at the given index
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut RatchetTreeNode> {
        self.nodes.get_mut(idx)
    }

    // It turns out that appending to the tree in this way preserves the left-balanced property
    // while keeping everything in place. Instead of a proof, stare this diagram where I add a new
    // leaf node to a tree of 3 leaves, and then add another leaf to that. The stars represent
    // non-leaf nodes.
    //         *                   *                        *
    //       /   \               /   \                _____/ \
    //      /     C   Add(D)    /     \    Add(E)    /        |
    //     *          =====>   *       *   =====>   *         |
    //    / \                 / \     / \         /   \       |
    //   A   B               A   B   C   D       /     \      |
    //   0 1 2 3  4          0 1 2 3 4 5 6      *       *     |
    //                                         / \     / \    |
    //                                        A   B   C   D   E
    //                                        0 1 2 3 4 5 6 7 8
    pub fn add_leaf_node(&mut self, node: RatchetTreeNode) {
        if self.nodes.is_empty() {
            self.nodes.push(node);
        } else {
            self.nodes.push(RatchetTreeNode::Blank);
            self.nodes.push(node);
        }
    }

    /// Blanks out the direct path of the given node, as well as the root node
    pub(crate) fn propogate_blank(&mut self, start_idx: usize) {
        let num_leaves = tree_math::num_leaves_in_tree(self.size());
        let direct_path = tree_math::node_direct_path(start_idx, num_leaves);

        for i in direct_path {
            self.nodes[i] = RatchetTreeNode::Blank;
        }

        let root_idx = tree_math::root_idx(num_leaves);
        self.nodes[root_idx] = RatchetTreeNode::Blank;
    }

    // This always produces a valid tree. To see this, note that truncating to a leaf node when
    // there are >1 non-blank leaf nodes gives you a vector of odd length. All vectors of odd
    // length have a unique interpretation as a binary left-balanced tree. And if there are no
    // non-blank leaf nodes, you get an empty tree.
    /// Truncates the tree down to the last non-blank leaf node
    pub(crate) fn truncate_to_last_nonblank(&mut self) {
        let num_leaves = tree_math::num_leaves_in_tree(self.size());

        let mut last_nonblank_leaf = None;
        for leaf_idx in tree_math::tree_leaves(num_leaves).rev() {
            if self.nodes[leaf_idx].is_filled() {
                last_nonblank_leaf = Some(leaf_idx);
            }
        }

        match last_nonblank_leaf {
            None => self.nodes.clear(),
            Some(i) => {
                let num_elements_to_retain = i + 1;
                self.nodes.truncate(num_elements_to_retain)
            }
        }
    }

    /// Returns a clone of this tree with every private key removed. Used to build the
    /// `WelcomeInfo` sent to a new member: they must learn every other member's public tree
    /// state, but nothing lets them impersonate an existing member's direct path.
    pub(crate) fn without_private_keys(&self) -> RatchetTree {
        let nodes = self
            .nodes
            .iter()
            .map(|node| match node {
                RatchetTreeNode::Blank => RatchetTreeNode::Blank,
                RatchetTreeNode::Filled {
                    public_key,
                    credential,
                    ..
                } => RatchetTreeNode::Filled {
                    public_key: public_key.clone(),
                    credential: credential.clone(),
                    private_key: None,
                    secret: None,
                },
            })
            .collect();
        RatchetTree { nodes }
    }

    /// Returns the indices of the resolution of a given node: this an ordered sequence of minimal
    /// set of non-blank nodes that collectively cover (A "covers" B iff A is an ancestor of B) all
    /// non-blank descendants of the given node. The ordering is ascending by node index.
    pub(crate) fn resolution(&self, idx: usize) -> Vec<usize> {
        fn helper(tree: &RatchetTree, i: usize, acc: &mut Vec<usize>) {
            if let RatchetTreeNode::Blank = tree.nodes[i] {
                if tree_math::node_level(i) == 0 {
                    return;
                } else {
                    let num_leaves = tree_math::num_leaves_in_tree(tree.nodes.len());
                    helper(tree, tree_math::node_left_child(i), acc);
                    helper(tree, tree_math::node_right_child(i, num_leaves), acc);
                }
            } else {
                acc.push(i);
            }
        }

        let mut ret = Vec::new();
        helper(self, idx, &mut ret);
        ret
    }

    /// Computes the recursive tree hash of the whole tree (spec §4.2): a leaf node hashes to
    /// `Hash(0x00 || optional(public_key) || optional(credential))`, and an intermediate node
    /// hashes to `Hash(0x01 || hash(left) || hash(right) || optional(public_key))`. Blank nodes
    /// encode the `optional` fields as absent rather than omitting them from the hash input, so a
    /// tree's hash is sensitive to which nodes are blank.
    pub(crate) fn tree_hash(&self, cs: &'static CipherSuite) -> Vec<u8> {
        fn optional_bytes(buf: &mut Vec<u8>, value: Option<&[u8]>) {
            match value {
                None => crate::wire::write_u8(buf, 0),
                Some(bytes) => {
                    crate::wire::write_u8(buf, 1);
                    crate::wire::write_vec(buf, bytes);
                }
            }
        }

        fn hash_node(tree: &RatchetTree, cs: &'static CipherSuite, idx: usize) -> Vec<u8> {
            if tree_math::node_level(idx) == 0 {
                let mut buf = vec![0x00u8];
                let node = &tree.nodes[idx];
                optional_bytes(&mut buf, node.get_public_key().map(|pk| &pk.as_bytes()[..]));
                match node.get_credential() {
                    None => crate::wire::write_u8(&mut buf, 0),
                    Some(cred) => {
                        crate::wire::write_u8(&mut buf, 1);
                        cred.encode(&mut buf);
                    }
                }
                cs.hash(&buf)
            } else {
                let num_leaves = tree_math::num_leaves_in_tree(tree.nodes.len());
                let left_hash = hash_node(tree, cs, tree_math::node_left_child(idx));
                let right_hash = hash_node(tree, cs, tree_math::node_right_child(idx, num_leaves));

                let mut buf = vec![0x01u8];
                buf.extend_from_slice(&left_hash);
                buf.extend_from_slice(&right_hash);
                optional_bytes(&mut buf, tree.nodes[idx].get_public_key().map(|pk| &pk.as_bytes()[..]));
                cs.hash(&buf)
            }
        }

        if self.size() == 0 {
            return cs.hash(&[]);
        }
        let num_leaves = tree_math::num_leaves_in_tree(self.size());
        hash_node(self, cs, tree_math::root_idx(num_leaves))
    }

    /// Given a node with a known secret, constructs a `DirectPathMessage` containing encrypted
    /// copies of the appropriately ratcheted secret for the rest of the ratchet tree. See section
    /// 4.6 for details.
    ///
    /// Walks the COPATH, not the direct path: spec §4.6 step 3 re-keys one ancestor per copath
    /// node (the copath is one element longer than the direct path, since it also covers the
    /// step from the last direct-path node up to the root), and encrypts that ancestor's path
    /// secret to the RESOLUTION of the copath node, not to the ancestor's own sibling. Walking
    /// `direct_path` directly here used to silently drop the root's own entry for any leaf whose
    /// parent already is the root (every two-leaf tree).
    ///
    /// Requires: `my_leaf_idx` to be a leaf node. Otherwise, any child of ours would be unable to
    /// decrypt this message.
    pub(crate) fn encrypt_direct_path_secrets(
        &self,
        cs: &'static CipherSuite,
        my_leaf_idx: usize,
        csprng: &mut dyn CryptoRng,
    ) -> Result<DirectPathMessage, Error> {
        if my_leaf_idx % 2 != 0 {
            return Err(Error::TreeError("Cannot encrypt direct paths of non-leaf nodes"));
        }

        let num_leaves = tree_math::num_leaves_in_tree(self.size());

        let mut node_messages = Vec::new();

        let my_public_key = self
            .get(my_leaf_idx)
            .ok_or(Error::TreeError("My tree index isn't in the tree"))?
            .get_public_key()
            .ok_or(Error::TreeError("My tree index is blank"))?;
        node_messages.push(DirectPathNodeMessage {
            public_key: my_public_key.clone(),
            node_secrets: Vec::with_capacity(0),
        });

        let mut ancestor_idx = my_leaf_idx;
        for copath_node_idx in tree_math::copath(my_leaf_idx, num_leaves) {
            ancestor_idx = tree_math::node_parent(ancestor_idx, num_leaves);
            let ancestor = self.get(ancestor_idx).ok_or(Error::TreeError("ancestor index out of range"))?;
            let ancestor_public_key = ancestor
                .get_public_key()
                .ok_or(Error::TreeError("re-keyed ancestor is unexpectedly blank"))?;
            let ancestor_path_secret = ancestor
                .get_secret()
                .ok_or(Error::TreeError("ancestor doesn't know its own path secret"))?;

            let mut node_secrets = Vec::new();
            for res_node in self.resolution(copath_node_idx).iter().map(|&i| &self.nodes[i]) {
                let others_public_key = res_node.get_public_key().unwrap();
                let ciphertext = ecies::ecies_encrypt(cs, others_public_key, ancestor_path_secret, csprng)?;
                node_secrets.push(ciphertext);
            }

            node_messages.push(DirectPathNodeMessage {
                public_key: ancestor_public_key.clone(),
                node_secrets,
            });
        }

        Ok(DirectPathMessage { node_messages })
    }

    /// Finds the (unique) ciphertext in the given direct path message that is meant for this
    /// participant and decrypts it. `sender_tree_idx` is the index of the creator of `msg`, and
    /// `my_tree_idx` is the index of the decryptor.
    ///
    /// Requires: `sender_tree_idx` cannot be an ancestor of `my_tree_idx`, nor vice-versa. We
    /// cannot decrypt messages that violate this.
    ///
    /// Returns: `Ok((pt, idx))` where `pt` is the plaintext of the found ciphertext and `idx` is
    /// the common ancestor of `sender_tree_idx` and `my_tree_idx`.
    pub(crate) fn decrypt_direct_path_message(
        &self,
        cs: &'static CipherSuite,
        direct_path_msg: &DirectPathMessage,
        sender_tree_idx: usize,
        my_tree_idx: usize,
    ) -> Result<(Vec<u8>, usize), Error> {
        let num_leaves = tree_math::num_leaves_in_tree(self.size());

        if sender_tree_idx >= self.size() || my_tree_idx >= self.size() {
            return Err(Error::TreeError("Input index out of range"));
        }

        if tree_math::is_ancestor(sender_tree_idx, my_tree_idx, num_leaves)
            || tree_math::is_ancestor(my_tree_idx, sender_tree_idx, num_leaves)
        {
            return Err(Error::TreeError("Cannot decrypt messages from ancestors or descendants"));
        }

        let common_ancestor_idx = tree_math::common_ancestor(sender_tree_idx, my_tree_idx, num_leaves);

        let node_msg = {
            // `node_extended_direct_path` excludes the leaf itself, but `node_messages[0]` is the
            // leaf's own entry, so every ancestor position is offset by one against it.
            let pos_in_ancestors = tree_math::node_extended_direct_path(sender_tree_idx, num_leaves)
                .into_iter()
                .position(|dp_idx| dp_idx == common_ancestor_idx)
                .expect("common ancestor somehow did not appear in direct path");
            direct_path_msg
                .node_messages
                .get(pos_in_ancestors + 1)
                .ok_or(Error::TreeError("Malformed DirectPathMessage"))?
        };

        let copath_ancestor_idx = {
            let left = tree_math::node_left_child(common_ancestor_idx);
            let right = tree_math::node_right_child(common_ancestor_idx, num_leaves);
            if tree_math::is_ancestor(left, my_tree_idx, num_leaves) {
                left
            } else {
                right
            }
        };

        let resolution = self.resolution(copath_ancestor_idx);

        for (pos_in_res, res_node_idx) in resolution.into_iter().enumerate() {
            let res_node = self.get(res_node_idx).expect("resolution out of bounds");
            if res_node.get_private_key().is_some()
                && tree_math::is_ancestor(res_node_idx, my_tree_idx, num_leaves)
            {
                let decryption_key = res_node.get_private_key().unwrap();
                let ciphertext_for_me = node_msg
                    .node_secrets
                    .get(pos_in_res)
                    .ok_or(Error::TreeError("Malformed DirectPathMessage"))?;

                let pt = ecies::ecies_decrypt(cs, decryption_key, ciphertext_for_me)?;
                return Ok((pt, common_ancestor_idx));
            }
        }

        Err(Error::NoPrivateKeyAvailable)
    }

    /// Updates the secret of the node at the given index and derives the path secrets, node
    /// secrets, private keys, and public keys of all its ancestors, up to and including the root.
    /// Returns the root's own path secret (spec §4.6's "update secret"): the value fed into the
    /// key schedule's `HKDF-Extract` for this epoch. If this process fails, this method will
    /// _not_ roll back the operation, so the caller should expect this object to be in an invalid
    /// state.
    ///
    /// Each node's stored "secret" (`get_secret`) is its own `path_secret[n]` — the value that
    /// was expanded into its `node_secret`/keypair — not the keypair-deriving `node_secret`
    /// itself. `encrypt_direct_path_secrets` needs exactly this value: spec §4.6 step 3 says "for
    /// each node in the resolution, encrypt `path_secret[k+1]`", and a recipient who decrypts it
    /// must be able to feed it straight back into this same function to continue the chain
    /// upward, which only works if what's encrypted (and stored) is the path secret, not the
    /// one-way `node_secret` derived from it.
    pub(crate) fn propogate_new_path_secret(
        &mut self,
        cs: &'static CipherSuite,
        mut path_secret: Vec<u8>,
        start_idx: usize,
    ) -> Result<Vec<u8>, Error> {
        let num_leaves = tree_math::num_leaves_in_tree(self.size());
        let root_node_idx = tree_math::root_idx(num_leaves);

        let mut current_node_idx = start_idx;

        loop {
            let prk = hkdf::hkdf_extract(cs, &[], &path_secret);
            // node_secret[n] = HKDF-Expand-Label(path_secret[n], "node", "", Hash.Length)
            let node_secret = hkdf::hkdf_expand_label(cs, &prk, b"node", b"");

            let (node_public_key, node_private_key) = cs.derive_key_pair(&node_secret)?;

            let current_node = self
                .get_mut(current_node_idx)
                .expect("reached invalid node in secret propogation");
            current_node.update_public_key(node_public_key);
            current_node.update_private_key(node_private_key);
            current_node.update_secret(path_secret.clone());

            if current_node_idx == root_node_idx {
                return Ok(path_secret);
            }

            // path_secret[n+1] = HKDF-Expand-Label(path_secret[n], "path", "", Hash.Length)
            path_secret = hkdf::hkdf_expand_label(cs, &prk, b"path", b"");
            current_node_idx = tree_math::node_parent(current_node_idx, num_leaves);
        }
    }
}

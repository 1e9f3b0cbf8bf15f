//! Left-balanced binary tree index arithmetic (spec §4.1, Appendix A of the
//! referenced MLS draft). Leaves sit at even indices, intermediate nodes at
//! odd indices, so every relationship between nodes is pure index
//! arithmetic and the tree itself can be stored as a flat `Vec`. Ported
//! from `original_source/libMLS/libMLS/tree_math.py`, with names matching
//! how the ratchet tree calls into this module (`root_idx`,
//! `num_leaves_in_tree`, `node_direct_path`, ...).

/// `floor(log2(x))`, with `log2(0) == 0` by the reference implementation's
/// convention (only ever called on node counts, which are always >= 1 in
/// practice).
fn log2(x: usize) -> usize {
    if x == 0 {
        return 0;
    }
    let mut k = 0;
    while (x >> k) > 0 {
        k += 1;
    }
    k - 1
}

/// The number of array slots needed to hold a tree with `num_leaves`
/// leaves.
pub fn num_nodes_in_tree(num_leaves: usize) -> usize {
    if num_leaves == 0 {
        return 0;
    }
    2 * (num_leaves - 1) + 1
}

/// Inverse of `num_nodes_in_tree`.
pub fn num_leaves_in_tree(num_nodes: usize) -> usize {
    if num_nodes == 0 {
        return 0;
    }
    (num_nodes / 2) + 1
}

/// The level of a node: leaves are level 0, and a node's level is one more
/// than the level of its (necessarily equal-level) children.
pub fn node_level(node_idx: usize) -> usize {
    if node_idx & 0x01 == 0 {
        return 0;
    }
    let mut k = 0;
    while ((node_idx >> k) & 0x01) == 1 {
        k += 1;
    }
    k
}

/// The index of the root node of a tree with `num_leaves` leaves.
pub fn root_idx(num_leaves: usize) -> usize {
    let width = num_nodes_in_tree(num_leaves);
    if width == 0 {
        return 0;
    }
    (1 << log2(width)) - 1
}

/// The immediate left child of an intermediate node. The tree is
/// left-balanced, so this never depends on the tree's size. A leaf is its
/// own left child.
pub fn node_left_child(node_idx: usize) -> usize {
    let level = node_level(node_idx);
    if level == 0 {
        return node_idx;
    }
    node_idx ^ (0x01 << (level - 1))
}

/// The immediate right child of an intermediate node, walked back down
/// until it lands inside a tree of `num_leaves` leaves. A leaf is its own
/// right child.
pub fn node_right_child(node_idx: usize, num_leaves: usize) -> usize {
    let level = node_level(node_idx);
    if level == 0 {
        return node_idx;
    }
    let mut right_idx = node_idx ^ (0x03 << (level - 1));
    while right_idx >= num_nodes_in_tree(num_leaves) {
        right_idx = node_left_child(right_idx);
    }
    right_idx
}

fn parent_step(node_idx: usize) -> usize {
    let level = node_level(node_idx);
    let b = (node_idx >> (level + 1)) & 0x01;
    (node_idx | (1 << level)) ^ (b << (level + 1))
}

/// The parent of a node, walked up until it lands inside a tree of
/// `num_leaves` leaves. The root is its own parent.
pub fn node_parent(node_idx: usize, num_leaves: usize) -> usize {
    let root = root_idx(num_leaves);
    if node_idx == root {
        return root;
    }
    let mut parent_idx = parent_step(node_idx);
    while parent_idx >= num_nodes_in_tree(num_leaves) {
        parent_idx = parent_step(parent_idx);
    }
    parent_idx
}

/// The other child of `node_idx`'s parent. The root's sibling is itself.
pub fn node_sibling(node_idx: usize, num_leaves: usize) -> usize {
    let parent_idx = node_parent(node_idx, num_leaves);
    if node_idx < parent_idx {
        node_right_child(parent_idx, num_leaves)
    } else if node_idx > parent_idx {
        node_left_child(parent_idx)
    } else {
        parent_idx
    }
}

/// The direct path of a node: its ancestors from (but not including) the
/// node itself, up to (but not including) the root, ordered from the node
/// upward.
pub fn node_direct_path(node_idx: usize, num_leaves: usize) -> Vec<usize> {
    let mut path = Vec::new();
    let root = root_idx(num_leaves);
    let mut parent_idx = node_parent(node_idx, num_leaves);
    while parent_idx != root {
        path.push(parent_idx);
        parent_idx = node_parent(parent_idx, num_leaves);
    }
    path
}

/// The direct path including the root, for callers that need the full
/// ancestor chain up to and including the root (spec §4.6's UpdatePath
/// covers every node up to the root, not stopping one short).
pub fn node_extended_direct_path(node_idx: usize, num_leaves: usize) -> Vec<usize> {
    let mut path = node_direct_path(node_idx, num_leaves);
    path.push(root_idx(num_leaves));
    path
}

/// The copath of a node: the siblings of every node on its direct path,
/// ordered from the node's own sibling up toward the root's child.
pub fn copath(node_idx: usize, num_leaves: usize) -> Vec<usize> {
    let mut path = node_direct_path(node_idx, num_leaves);
    if node_idx != node_sibling(node_idx, num_leaves) {
        path.insert(0, node_idx);
    }
    path.into_iter().map(|y| node_sibling(y, num_leaves)).collect()
}

/// All leaf indices of a tree with `num_leaves` leaves, in left-to-right
/// order.
pub fn tree_leaves(num_leaves: usize) -> std::vec::IntoIter<usize> {
    (0..num_leaves).map(|i| 2 * i).collect::<Vec<_>>().into_iter()
}

pub fn is_leaf(node_idx: usize) -> bool {
    node_idx % 2 == 0
}

/// Whether `maybe_ancestor` lies on the direct path from `node_idx` up to
/// (and including) the root, i.e. whether it is an ancestor of `node_idx`
/// or `node_idx` itself.
pub fn is_ancestor(maybe_ancestor: usize, node_idx: usize, num_leaves: usize) -> bool {
    if maybe_ancestor == node_idx {
        return true;
    }
    node_extended_direct_path(node_idx, num_leaves).contains(&maybe_ancestor)
}

/// The lowest common ancestor of two nodes: the first node that appears in
/// both of their extended direct paths.
pub fn common_ancestor(a: usize, b: usize, num_leaves: usize) -> usize {
    let path_a = node_extended_direct_path(a, num_leaves);
    let path_b = node_extended_direct_path(b, num_leaves);
    for candidate in &path_a {
        if *candidate == b || path_b.contains(candidate) {
            return *candidate;
        }
    }
    root_idx(num_leaves)
}

#[cfg(test)]
mod test {
    use super::*;

    // Five-leaf tree from the reference implementation's own worked example:
    //
    //                 X
    //         X               X
    //     X       X       X
    //   X   X   X   X   X   X
    //   0 1 2 3 4 5 6 7 8 9 10

    #[test]
    fn root_matches_worked_example() {
        assert_eq!(root_idx(5), 7);
        assert_eq!(root_idx(1), 0);
        assert_eq!(root_idx(2), 1);
    }

    #[test]
    fn direct_path_matches_worked_example() {
        assert_eq!(node_direct_path(0, 5), vec![1, 3]);
        assert_eq!(node_direct_path(4, 5), vec![5, 3]);
    }

    #[test]
    fn copath_matches_worked_example() {
        assert_eq!(copath(0, 5), vec![2, 5, 8]);
    }

    #[test]
    fn sibling_of_root_is_itself() {
        let root = root_idx(5);
        assert_eq!(node_sibling(root, 5), root);
    }

    #[test]
    fn leaf_children_are_themselves() {
        assert_eq!(node_left_child(4), 4);
        assert_eq!(node_right_child(4, 5), 4);
    }

    #[test]
    fn is_ancestor_agrees_with_direct_path() {
        assert!(is_ancestor(3, 0, 5));
        assert!(is_ancestor(7, 0, 5));
        assert!(!is_ancestor(9, 0, 5));
        assert!(is_ancestor(0, 0, 5));
    }

    #[test]
    fn common_ancestor_of_adjacent_leaves_is_their_parent() {
        assert_eq!(common_ancestor(0, 2, 5), 1);
        assert_eq!(common_ancestor(0, 4, 5), 3);
    }

    #[test]
    fn node_count_round_trips_leaf_count() {
        for n in 1..20 {
            assert_eq!(num_leaves_in_tree(num_nodes_in_tree(n)), n);
        }
    }

    // spec §8 universal invariant: for every tree and every non-root index i,
    // parent(i) != i and level(parent(i)) > level(i).
    #[quickcheck_macros::quickcheck]
    fn parent_strictly_increases_level(num_leaves: u8, node_idx: u8) -> quickcheck::TestResult {
        let num_leaves = (num_leaves as usize) + 1;
        let num_nodes = num_nodes_in_tree(num_leaves);
        let node_idx = (node_idx as usize) % num_nodes;

        let root = root_idx(num_leaves);
        if node_idx == root {
            return quickcheck::TestResult::discard();
        }

        let parent = node_parent(node_idx, num_leaves);
        if parent == node_idx {
            return quickcheck::TestResult::from_bool(false);
        }
        quickcheck::TestResult::from_bool(node_level(parent) > node_level(node_idx))
    }

    #[quickcheck_macros::quickcheck]
    fn root_is_its_own_parent(num_leaves: u8) -> bool {
        let num_leaves = (num_leaves as usize) + 1;
        let root = root_idx(num_leaves);
        node_parent(root, num_leaves) == root
    }
}

/// Merkle tree over reward leaves.
/// Pairs are sorted before hashing so a proof verifies without position bits,
/// matching the airdrop contract's verifier.

use alloy_primitives::{keccak256, Address, B256, U256};

// ============================================================================
// Leaf Encoding
// ============================================================================

/// Leaf for one recipient: keccak256 over the packed
/// `(address token, address recipient, uint256 amount, uint256 index)` tuple
pub fn reward_leaf(token: &Address, recipient: &Address, amount: U256, index: u64) -> B256 {
    let mut data = [0u8; 104];
    data[..20].copy_from_slice(token.as_slice());
    data[20..40].copy_from_slice(recipient.as_slice());
    data[40..72].copy_from_slice(&amount.to_be_bytes::<32>());
    data[72..].copy_from_slice(&U256::from(index).to_be_bytes::<32>());
    keccak256(data)
}

/// Parent of two nodes, children ordered before hashing
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_slice());
    data[32..].copy_from_slice(right.as_slice());
    keccak256(data)
}

/// Recompute the path from `leaf` and compare against `root`
pub fn verify_proof(leaf: &B256, proof: &[B256], root: &B256) -> bool {
    let computed = proof.iter().fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    &computed == root
}

// ============================================================================
// Merkle Tree
// ============================================================================

/// Tree with every level kept for proof generation
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Build bottom-up. A node without a partner is promoted to the next level
    /// unchanged.
    pub fn new(leaves: Vec<B256>) -> Self {
        let mut levels = vec![leaves];

        while let Some(current) = levels.last() {
            if current.len() <= 1 {
                break;
            }
            let next: Vec<B256> = current
                .chunks(2)
                .map(|pair| if pair.len() == 2 { hash_pair(&pair[0], &pair[1]) } else { pair[0] })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// Root hash; zero for an empty tree
    pub fn root(&self) -> B256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(B256::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn leaves(&self) -> &[B256] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sibling path for the leaf at `position`
    pub fn proof(&self, position: usize) -> Option<Vec<B256>> {
        if position >= self.leaf_count() {
            return None;
        }

        let mut proof = Vec::new();
        let mut index = position;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = index ^ 1;
            // Promoted nodes have no sibling at this level
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            index /= 2;
        }

        Some(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(count: u8) -> Vec<B256> {
        (0..count)
            .map(|i| reward_leaf(&Address::repeat_byte(0x11), &Address::repeat_byte(0xa1 + i), U256::from(250), 1))
            .collect()
    }

    #[test]
    fn test_leaf_matches_packed_encoding() {
        let leaf = reward_leaf(&Address::repeat_byte(0x11), &Address::repeat_byte(0x22), U256::from(250), 1);
        assert_eq!(
            leaf,
            "0xa031f97c3b5ace7b6c070dcaf02d7862cf147c15ed941a8d3b9b561c402a7bbb"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn test_four_leaf_tree() {
        let tree = MerkleTree::new(leaves(4));
        let root = tree.root();
        assert_eq!(
            root,
            "0xba3517b118bcde066c346ef6c60281c74fdfba6a919b7ed17f1fab68d9c1db31"
                .parse::<B256>()
                .unwrap()
        );

        for (position, leaf) in tree.leaves().iter().enumerate() {
            let proof = tree.proof(position).unwrap();
            assert_eq!(proof.len(), 2);
            assert!(verify_proof(leaf, &proof, &root));
        }
    }

    #[test]
    fn test_odd_node_is_promoted() {
        let tree = MerkleTree::new(leaves(3));
        assert_eq!(
            tree.root(),
            "0xc566743db89b9f9487d122e81cb9a88e1565bf4d6bc0a41c9c2533cca2bb5de2"
                .parse::<B256>()
                .unwrap()
        );

        // The third leaf skips the first level
        assert_eq!(tree.proof(2).unwrap().len(), 1);
        for (position, leaf) in tree.leaves().iter().enumerate() {
            assert!(verify_proof(leaf, &tree.proof(position).unwrap(), &tree.root()));
        }
    }

    #[test]
    fn test_root_independent_of_pair_order() {
        let mut swapped = leaves(2);
        swapped.reverse();
        assert_eq!(MerkleTree::new(leaves(2)).root(), MerkleTree::new(swapped).root());
    }

    #[test]
    fn test_degenerate_trees() {
        let empty = MerkleTree::new(Vec::new());
        assert_eq!(empty.root(), B256::ZERO);
        assert!(empty.proof(0).is_none());

        let single = MerkleTree::new(leaves(1));
        assert_eq!(single.root(), single.leaves()[0]);
        assert!(single.proof(0).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = MerkleTree::new(leaves(5));
        let root = tree.root();
        let mut proof = tree.proof(1).unwrap();
        proof[0] = B256::repeat_byte(0xff);
        assert!(!verify_proof(&tree.leaves()[1], &proof, &root));

        let other = reward_leaf(&Address::repeat_byte(0x11), &Address::repeat_byte(0x99), U256::from(250), 1);
        assert!(!verify_proof(&other, &tree.proof(1).unwrap(), &root));
    }
}

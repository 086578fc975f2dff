use super::constellation::Codeword;
use std::fmt;
use wifi_core::error::{PhyError, PhyResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct VlcNode {
    /// Child for a 0 bit then a 1 bit.
    children: [Option<usize>; 2],
    symbol: Option<usize>,
}

/// Binary decoding tree for a prefix code, stored as an arena of nodes.
/// Leaves hold symbols and a 0 bit follows the left child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlcTree {
    nodes: Vec<VlcNode>,
}

impl Default for VlcTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VlcTree {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![VlcNode::default()],
        }
    }

    pub fn from_codewords(codewords: &[Codeword]) -> PhyResult<Self> {
        let mut tree = Self::new();
        for (symbol, codeword) in codewords.iter().enumerate() {
            tree.insert(symbol, codeword)?;
        }
        Ok(tree)
    }

    /// Adds a leaf for `symbol`. Fails when the codeword and an existing codeword prefix each other.
    pub fn insert(&mut self, symbol: usize, codeword: &Codeword) -> PhyResult<()> {
        assert!(codeword.length > 0, "Codeword for symbol {} is empty", symbol);
        let mut node = Self::ROOT;
        for bit in codeword.iter_bits() {
            if self.nodes[node].symbol.is_some() {
                return Err(PhyError::PrefixConflict(symbol));
            }
            node = match self.nodes[node].children[bit as usize] {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(VlcNode::default());
                    self.nodes[node].children[bit as usize] = Some(child);
                    child
                },
            };
        }
        let leaf = &mut self.nodes[node];
        if leaf.symbol.is_some() || leaf.children.iter().any(|x| x.is_some()) {
            return Err(PhyError::PrefixConflict(symbol));
        }
        leaf.symbol = Some(symbol);
        Ok(())
    }

    /// Follows one bit from `node`. Returns None if the code does not cover that branch.
    pub fn step(&self, node: usize, bit: u8) -> Option<usize> {
        self.nodes.get(node)?.children[(bit & 1) as usize]
    }

    pub fn symbol(&self, node: usize) -> Option<usize> {
        self.nodes[node].symbol
    }

    pub fn nb_leaves(&self) -> usize {
        self.nodes.iter().filter(|x| x.symbol.is_some()).count()
    }

    /// True when every inner node has both children, so any bit string can be parsed.
    pub fn is_complete(&self) -> bool {
        self.nodes
            .iter()
            .all(|x| x.symbol.is_some() || x.children.iter().all(|c| c.is_some()))
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, node: usize, indent: usize) -> fmt::Result {
        let VlcNode { children, symbol } = &self.nodes[node];
        if let Some(child) = children[1] {
            self.fmt_node(f, child, indent+4)?;
        }
        match symbol {
            Some(symbol) => writeln!(f, "{:indent$}{}", "", symbol, indent = indent)?,
            None => writeln!(f, "{:indent$}*", "", indent = indent)?,
        }
        if let Some(child) = children[0] {
            self.fmt_node(f, child, indent+4)?;
        }
        Ok(())
    }
}

/// Sideways view of the tree with the 1 branch above each node.
impl fmt::Display for VlcTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, Self::ROOT, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlc::constellation::{VlcConstellation, SUPPORTED_ORDERS};

    #[test]
    fn test_tree_has_one_leaf_per_symbol() {
        for order in SUPPORTED_ORDERS {
            let constellation = VlcConstellation::new(order).unwrap();
            let tree = VlcTree::from_codewords(&constellation.codewords).unwrap();
            assert_eq!(tree.nb_leaves(), order);
            assert!(tree.is_complete());
            // A full binary tree with n leaves has n-1 inner nodes
            assert_eq!(tree.nodes.len(), 2*order - 1);
        }
    }

    #[test]
    fn test_walk_finds_symbol() {
        let codewords = [
            Codeword { bits: 0b0, length: 1 },
            Codeword { bits: 0b10, length: 2 },
            Codeword { bits: 0b11, length: 2 },
        ];
        let tree = VlcTree::from_codewords(&codewords).unwrap();
        let node = tree.step(VlcTree::ROOT, 1).unwrap();
        assert_eq!(tree.symbol(node), None);
        assert_eq!(tree.symbol(tree.step(node, 0).unwrap()), Some(1));
        assert_eq!(tree.symbol(tree.step(VlcTree::ROOT, 0).unwrap()), Some(0));
        assert_eq!(tree.to_string(), "        2\n    *\n        1\n*\n    0\n");
    }

    #[test]
    fn test_prefix_conflicts() {
        let mut tree = VlcTree::new();
        tree.insert(0, &Codeword { bits: 0b01, length: 2 }).unwrap();
        assert_eq!(tree.insert(1, &Codeword { bits: 0b0, length: 1 }), Err(PhyError::PrefixConflict(1)));
        assert_eq!(tree.insert(2, &Codeword { bits: 0b011, length: 3 }), Err(PhyError::PrefixConflict(2)));
        assert_eq!(tree.insert(3, &Codeword { bits: 0b01, length: 2 }), Err(PhyError::PrefixConflict(3)));
        assert!(!tree.is_complete());
        assert_eq!(tree.step(VlcTree::ROOT, 1), None);
        assert_eq!(tree.step(100, 0), None);
    }
}

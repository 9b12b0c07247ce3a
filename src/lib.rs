//! Build, query and edit rooted phylogenetic trees.
//!
//! Trees are read from newick strings or edge tables, or simulated with
//! [`generate_tree`]. Every edit returns a new [`tree::Tree`], the original
//! is never modified.
//!
//! ```
//! use phylokit::tree::Tree;
//!
//! let tree = Tree::from_newick("((((A,B),C),(D,E)),F);").unwrap();
//! let abc = tree.mrca(&["A", "B", "C"]).unwrap();
//! assert_eq!(tree.descendant_tips(&abc).unwrap().len(), 3);
//!
//! let pruned = tree.prune(&["A", "B", "C"]).unwrap();
//! assert_eq!(pruned.to_newick().unwrap(), "((D,E),F);");
//! ```

use clap::ValueEnum;
use rand::prelude::*;

use distr::{Distr, Sampler};
use tree::{Node, Tree, TreeBuilder, TreeError};

pub mod collection;
pub mod distr;
pub mod tree;

/// Shape of randomly generated trees
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum TreeShape {
    /// Recursively split the set of tips in two at a uniformly chosen point
    Uniform,
    /// Pure birth process: repeatedly split a uniformly chosen tip
    Yule,
    /// Ladder shaped tree, every internal node has a tip child
    Caterpillar,
}

/// Generates a random binary tree with `n_tips` tips labelled `t1` to `tn`
/// in random order. Branch lengths are drawn from `branch_lengths` if a
/// distribution is given, the tree has no branch lengths otherwise.
///
/// ```
/// use phylokit::{generate_tree, TreeShape, distr::Distr};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let tree = generate_tree(10, TreeShape::Yule, Some(Distr::Exponential), &mut rng).unwrap();
///
/// assert_eq!(tree.n_tips(), 10);
/// assert!(tree.is_binary());
/// assert!(tree.has_branch_lengths());
///
/// assert!(generate_tree(1, TreeShape::Yule, None, &mut rng).is_err());
/// ```
pub fn generate_tree<R: Rng + ?Sized>(
    n_tips: usize,
    shape: TreeShape,
    branch_lengths: Option<Distr>,
    rng: &mut R,
) -> Result<Tree, TreeError> {
    if n_tips < 2 {
        return Err(TreeError::InvalidTipCount(n_tips));
    }

    let sampler = branch_lengths.map(Sampler::new).transpose()?;
    let edge = |rng: &mut R| sampler.as_ref().map(|s| s.sample(rng));

    let mut builder = TreeBuilder::new();
    let root = builder.add(Node::new());

    let tips = match shape {
        TreeShape::Uniform => {
            let mut tips = vec![];
            let mut to_split = vec![(root, n_tips)];
            while let Some((parent, size)) = to_split.pop() {
                if size == 1 {
                    tips.push(parent);
                    continue;
                }
                let left = rng.gen_range(1..size);
                for part in [size - left, left] {
                    let l = edge(rng);
                    to_split.push((builder.add_child(Node::new(), parent, l)?, part));
                }
            }
            tips
        }
        TreeShape::Yule => {
            let mut tips = vec![root];
            while tips.len() < n_tips {
                let parent = tips.swap_remove(rng.gen_range(0..tips.len()));
                for _ in 0..2 {
                    let l = edge(rng);
                    tips.push(builder.add_child(Node::new(), parent, l)?);
                }
            }
            tips
        }
        TreeShape::Caterpillar => {
            let mut tips = vec![];
            let mut parent = root;
            for i in 1..n_tips {
                let l1 = edge(rng);
                tips.push(builder.add_child(Node::new(), parent, l1)?);
                let l2 = edge(rng);
                let next = builder.add_child(Node::new(), parent, l2)?;
                if i == n_tips - 1 {
                    tips.push(next);
                }
                parent = next;
            }
            tips
        }
    };

    let mut labels: Vec<_> = (1..=n_tips).map(|i| format!("t{i}")).collect();
    labels.shuffle(rng);
    for (id, label) in tips.iter().zip(labels) {
        builder.get_mut(id)?.set_name(label);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;

    use super::*;

    const SHAPES: [TreeShape; 3] = [TreeShape::Uniform, TreeShape::Yule, TreeShape::Caterpillar];

    #[test]
    fn generated_trees_are_binary() {
        let mut rng = StdRng::seed_from_u64(42);
        for shape in SHAPES {
            for n_tips in [2, 3, 10, 57] {
                let tree = generate_tree(n_tips, shape, None, &mut rng).unwrap();

                assert_eq!(tree.n_tips(), n_tips);
                assert_eq!(tree.n_internal(), n_tips - 1);
                assert!(tree.is_binary());
                assert!(!tree.has_branch_lengths());

                let labels: BTreeSet<String> =
                    tree.tip_labels().into_iter().map(String::from).collect();
                let expected: BTreeSet<String> = (1..=n_tips).map(|i| format!("t{i}")).collect();
                assert_eq!(labels, expected);
            }
        }
    }

    #[test]
    fn too_few_tips() {
        let mut rng = StdRng::seed_from_u64(0);
        for n_tips in [0, 1] {
            assert!(matches!(
                generate_tree(n_tips, TreeShape::Uniform, None, &mut rng),
                Err(TreeError::InvalidTipCount(n)) if n == n_tips
            ));
        }
    }

    #[test]
    fn caterpillar_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let tree = generate_tree(8, TreeShape::Caterpillar, None, &mut rng).unwrap();

        for node in tree.n_tips() + 1..=tree.size() {
            let children = tree.children(&node).unwrap();
            assert!(children.iter().any(|c| tree.is_tip(c).unwrap()));
        }
        assert_eq!(tree.height(), 7.0);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        for shape in SHAPES {
            let first = generate_tree(
                20,
                shape,
                Some(Distr::Gamma),
                &mut StdRng::seed_from_u64(99),
            )
            .unwrap();
            let second = generate_tree(
                20,
                shape,
                Some(Distr::Gamma),
                &mut StdRng::seed_from_u64(99),
            )
            .unwrap();

            assert_eq!(first, second);
            assert!(first.has_branch_lengths());
            assert!(first.edge_lengths().unwrap().iter().all(|l| *l > 0.0));
        }
    }
}

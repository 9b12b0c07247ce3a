use std::collections::BTreeSet;

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::RngCore;

use super::builder::TreeBuilder;
use super::node::Node;
use super::tree_impl::{Tree, TreeError};
use super::{EdgeLength, NodeId};

/// How to break up nodes with more than two children.
pub enum Resolution<'a> {
    /// Repeatedly join the first two children: `(c1,c2,c3,c4)` becomes
    /// `(((c1,c2),c3),c4)`. Deterministic and idempotent.
    Ordered,
    /// Join random pairs of children drawn from the given source.
    Random(&'a mut dyn RngCore),
}

/// Structural edits of the [`Tree`]. None of them modify the tree they are
/// called on, they return a new, renumbered [`Tree`].
///
/// ----
/// ----
impl Tree {
    // ##################
    // # ALTER THE TREE #
    // ##################

    /// Swaps the two children of a node.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B),C);").unwrap();
    /// let rotated = tree.rotate(&tree.root()).unwrap();
    ///
    /// assert_eq!(rotated.to_newick().unwrap(), "(C,(A,B));");
    /// assert_eq!(rotated.rotate(&rotated.root()).unwrap(), tree);
    /// ```
    pub fn rotate(&self, node: &NodeId) -> Result<Tree, TreeError> {
        let children = self.children(node)?;
        if children.len() != 2 {
            return Err(TreeError::NotBinaryNode {
                node: *node,
                children: children.len(),
            });
        }

        let mut builder = TreeBuilder::from(self);
        builder.get_mut(node)?.children.swap(0, 1);

        builder.build()
    }

    /// Removes tips from the tree, along with the internal nodes left without
    /// children. Internal nodes left with a single child are removed and
    /// their edges fused. Labels that are not in the tree are ignored.
    /// # Example
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B), C), (D,E)),F);").unwrap();
    /// let pruned = tree.prune(&["A", "B", "C"]).unwrap();
    ///
    /// assert_eq!(pruned.to_newick().unwrap(), "((D,E),F);");
    /// ```
    pub fn prune<S: AsRef<str>>(&self, tips: &[S]) -> Result<Tree, TreeError> {
        let mut to_remove = BTreeSet::new();
        for label in tips.iter().map(AsRef::as_ref) {
            match self.tip_id(label) {
                Some(id) => {
                    to_remove.insert(id);
                }
                None => warn!("Tip {label:?} is not in the tree, ignoring it"),
            }
        }

        let remaining = self.n_tips() - to_remove.len();
        if remaining < 2 {
            return Err(TreeError::EmptyResult { remaining });
        }

        let mut builder = TreeBuilder::from(self);
        for tip in to_remove.iter() {
            builder.remove_tip(tip)?;
        }

        debug!("Pruned {} tips, {remaining} left", to_remove.len());

        builder.build()
    }

    /// Keeps only the given tips, pruning all the others.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B), C), (D,E)),F);").unwrap();
    /// let kept = tree.keep_tips(&["A", "C", "F"]).unwrap();
    ///
    /// assert_eq!(kept.to_newick().unwrap(), "((A,C),F);");
    /// ```
    pub fn keep_tips<S: AsRef<str>>(&self, tips: &[S]) -> Result<Tree, TreeError> {
        let keep: BTreeSet<&str> = tips.iter().map(AsRef::as_ref).collect();
        for label in keep.iter().filter(|label| self.tip_id(label).is_none()) {
            warn!("Tip {label:?} is not in the tree, ignoring it");
        }

        let complement: Vec<&str> = self
            .tip_labels()
            .into_iter()
            .filter(|label| !keep.contains(label))
            .collect();

        self.prune(&complement)
    }

    /// Returns the subtree rooted at an internal node as a new tree.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B), C), (D,E)),F);").unwrap();
    /// let clade = tree.extract_clade(&tree.mrca(&["A", "C"]).unwrap()).unwrap();
    ///
    /// assert_eq!(clade.to_newick().unwrap(), "((A,B),C);");
    /// ```
    pub fn extract_clade(&self, node: &NodeId) -> Result<Tree, TreeError> {
        if self.is_tip(node)? {
            return Err(TreeError::NotInternalNode(*node));
        }

        let mut builder = TreeBuilder::new();
        let root = builder.graft(self, *node)?;
        builder.get_mut(&root)?.parent_edge = None;

        builder.build()
    }

    /// Resolves multifurcations to binarize the tree. The added edges have
    /// a length of 0 if the tree has branch lengths.
    ///
    /// ```
    /// use phylokit::tree::{Resolution, Tree};
    /// use rand::{rngs::StdRng, SeedableRng};
    ///
    /// let tree = Tree::from_newick("((A:0.1,B:0.2):0.3,(C:0.1,D:0.2,E:0.4)F:0.5)G;").unwrap();
    /// assert!(!tree.is_binary());
    ///
    /// let ordered = tree.resolve_polytomies(Resolution::Ordered).unwrap();
    /// assert_eq!(
    ///     ordered.to_newick().unwrap(),
    ///     "((A:0.1,B:0.2):0.3,((C:0.1,D:0.2):0,E:0.4)F:0.5)G;"
    /// );
    ///
    /// let mut rng = StdRng::seed_from_u64(42);
    /// let random = tree.resolve_polytomies(Resolution::Random(&mut rng)).unwrap();
    /// assert!(random.is_binary());
    /// ```
    pub fn resolve_polytomies(&self, resolution: Resolution<'_>) -> Result<Tree, TreeError> {
        let mut resolution = resolution;
        let synthetic_edge = self.has_branch_lengths().then_some(0.0);

        let to_binarize: Vec<_> = self
            .preorder(&self.root())?
            .into_iter()
            .filter(|id| self.nodes()[id - 1].children.len() > 2)
            .collect();

        let mut builder = TreeBuilder::from(self);
        for node_id in to_binarize.iter() {
            loop {
                let mut children = builder.get(node_id)?.children.clone();
                if children.len() <= 2 {
                    break;
                }

                match &mut resolution {
                    Resolution::Ordered => {
                        merge_children(
                            &mut builder,
                            node_id,
                            [children[0], children[1]],
                            synthetic_edge,
                            Placement::First,
                        )?;
                    }
                    Resolution::Random(rng) => {
                        children.shuffle(&mut **rng);
                        let pair = [children[children.len() - 1], children[children.len() - 2]];
                        merge_children(&mut builder, node_id, pair, synthetic_edge, Placement::Last)?;
                    }
                }
            }
        }

        debug!("Resolved {} polytomies", to_binarize.len());

        builder.build()
    }

    /// Attaches `graft` to the tree at a given node:
    ///  - at an internal node, the graft becomes one more child of the node
    ///  - at a tip, a new node is created on the edge leading to the tip and
    ///    both the tip and the graft become its children
    ///  - at the root, a new root is created with the old root and the graft
    ///    as its children
    ///
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let host = Tree::from_newick("((A,B),C);").unwrap();
    /// let graft = Tree::from_newick("(X,Y);").unwrap();
    ///
    /// let bound = host.bind(&graft, &host.tip_id("C").unwrap()).unwrap();
    /// assert_eq!(bound.to_newick().unwrap(), "((A,B),(C,(X,Y)));");
    ///
    /// assert!(host.bind(&host, &1).is_err());
    /// ```
    pub fn bind(&self, graft: &Tree, attachment: &NodeId) -> Result<Tree, TreeError> {
        let attachment_node = self.get(attachment)?;
        if let Some(label) = graft
            .tip_labels()
            .into_iter()
            .find(|label| self.tip_id(label).is_some())
        {
            return Err(TreeError::DuplicateTipLabel(label.to_string()));
        }

        let host_lengths = self.has_branch_lengths();
        let zero = host_lengths.then_some(0.0);
        let stem = graft.root_edge().or(zero);

        let attached_to_tip = self.is_tip(attachment)?;

        let mut builder = TreeBuilder::from(self);
        let grafted = builder.graft(graft, graft.root())?;

        let target = match attachment_node.parent {
            // New root above the old one
            None => {
                let new_root = builder.add(Node {
                    parent_edge: attachment_node.parent_edge,
                    ..Node::new()
                });
                builder.get_mut(attachment)?.set_parent(new_root, zero);
                builder.get_mut(&new_root)?.add_child(*attachment);
                new_root
            }
            // New node on the edge leading to the tip
            Some(parent) if attached_to_tip => {
                let edge = attachment_node.parent_edge;
                let joint = builder.add(Node::new());
                builder.get_mut(&parent)?.replace_child(attachment, joint);
                builder.get_mut(&joint)?.set_parent(parent, edge);
                builder.get_mut(&joint)?.add_child(*attachment);
                builder
                    .get_mut(attachment)?
                    .set_parent(joint, edge.map(|_| 0.0));
                joint
            }
            Some(_) => *attachment,
        };

        builder.get_mut(&grafted)?.set_parent(target, stem);
        builder.get_mut(&target)?.add_child(grafted);

        debug!(
            "Bound a tree with {} tips at node {attachment}",
            graft.n_tips()
        );

        builder.build()
    }

    /// Sort children of every node by increasing number of descendants
    ///
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A,(((D,(E,F)),C),B));").unwrap();
    /// let ladderized = tree.ladderize().unwrap();
    ///
    /// assert_eq!(ladderized.to_newick().unwrap(), "(A,(B,(C,(D,(E,F)))));");
    /// ```
    pub fn ladderize(&self) -> Result<Tree, TreeError> {
        let mut builder = TreeBuilder::from(self);
        let mut descendant_counter = vec![0; self.size() + 1];

        // Go from tips to root
        for node_id in self.postorder(&self.root())? {
            let node = builder.get_mut(&node_id)?;
            for child in node.children.iter() {
                descendant_counter[node_id] += descendant_counter[*child] + 1;
            }
            node.children.sort_by_key(|v| descendant_counter[*v]);
        }

        builder.build()
    }
}

enum Placement {
    First,
    Last,
}

// Moves two siblings under a new node that takes their place among the
// children of `parent`.
fn merge_children(
    builder: &mut TreeBuilder,
    parent: &NodeId,
    pair: [NodeId; 2],
    edge: Option<EdgeLength>,
    placement: Placement,
) -> Result<NodeId, TreeError> {
    let joint = builder.add(Node::new());

    let parent_node = builder.get_mut(parent)?;
    for child in pair.iter() {
        parent_node.remove_child(child);
    }
    match placement {
        Placement::First => parent_node.children.insert(0, joint),
        Placement::Last => parent_node.children.push(joint),
    }

    builder.get_mut(&joint)?.set_parent(*parent, edge);
    for child in pair {
        let child_edge = builder.get(&child)?.parent_edge;
        builder.get_mut(&child)?.set_parent(joint, child_edge);
        builder.get_mut(&joint)?.add_child(child);
    }

    Ok(joint)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{generate_tree, TreeShape};

    const SCENARIO: &str = "((((A,B), C), (D,E)),F);";

    fn newick(tree: &Tree) -> String {
        tree.to_newick().unwrap()
    }

    #[test]
    fn rotate_is_its_own_inverse() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        for node in tree.n_tips() + 1..=tree.size() {
            let rotated = tree.rotate(&node).unwrap();
            assert_ne!(rotated, tree);
            assert_eq!(rotated.rotate(&node).unwrap(), tree);
        }

        let rotated = tree.rotate(&tree.root()).unwrap();
        assert_eq!(newick(&rotated), "(F,(((A,B),C),(D,E)));");
        assert_eq!(rotated.tip_labels(), vec!["F", "A", "B", "C", "D", "E"]);
    }

    #[test]
    fn rotate_failures() {
        let tree = Tree::from_newick("((A,B,C),D);").unwrap();

        assert!(matches!(
            tree.rotate(&6),
            Err(TreeError::NotBinaryNode {
                node: 6,
                children: 3
            })
        ));
        assert!(matches!(
            tree.rotate(&1),
            Err(TreeError::NotBinaryNode {
                node: 1,
                children: 0
            })
        ));
        assert!(matches!(tree.rotate(&7), Err(TreeError::UnknownNode(7))));
    }

    #[test]
    fn prune_scenario() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        let pruned = tree.prune(&["A", "B", "C"]).unwrap();

        assert_eq!(pruned, Tree::from_newick("((D,E),F);").unwrap());
        assert_eq!(pruned.n_tips(), 3);
        assert_eq!(pruned.n_internal(), 2);
        assert_eq!(pruned.edges(), vec![(4, 5), (5, 1), (5, 2), (4, 3)]);
        // The input is left untouched
        assert_eq!(tree.n_tips(), 6);
    }

    #[test]
    fn prune_clades() {
        let tree = Tree::from_newick("((A,(C,E)D)B,(H,(I,J,K)L)G)F;").unwrap();
        for node in tree.n_tips() + 1..=tree.size() {
            let clade = tree.descendant_tips(&node).unwrap();
            let labels: Vec<_> = clade.iter().collect();
            let expected = tree.n_tips() - clade.len();

            match tree.prune(&labels) {
                Ok(pruned) => {
                    assert_eq!(pruned.n_tips(), expected);
                    let left: BTreeSet<_> =
                        pruned.tip_labels().into_iter().map(String::from).collect();
                    assert!(left.is_disjoint(&clade));
                }
                Err(TreeError::EmptyResult { remaining }) => {
                    assert_eq!(remaining, expected);
                    assert!(expected < 2);
                }
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[test]
    fn prune_fuses_branch_lengths() {
        let tree = Tree::from_newick("((A:1,B:2):0.5,C:3):0.25;").unwrap();

        assert_eq!(newick(&tree.prune(&["B"]).unwrap()), "(A:1.5,C:3):0.25;");
        assert_eq!(newick(&tree.prune(&["C"]).unwrap()), "(A:1,B:2):0.25;");
    }

    #[test]
    fn prune_ignores_unknown_and_rejects_empty() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        assert_eq!(
            tree.prune(&["F", "Z"]).unwrap(),
            Tree::from_newick("(((A,B),C),(D,E));").unwrap()
        );
        assert!(matches!(
            tree.prune(&["A", "B", "C", "D", "E"]),
            Err(TreeError::EmptyResult { remaining: 1 })
        ));

        let all = tree.tip_labels();
        assert!(matches!(
            tree.prune(&all),
            Err(TreeError::EmptyResult { remaining: 0 })
        ));
    }

    #[test]
    fn keep_is_prune_of_complement() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        assert_eq!(
            tree.keep_tips(&["D", "E", "F"]).unwrap(),
            tree.prune(&["A", "B", "C"]).unwrap()
        );
        assert!(matches!(
            tree.keep_tips(&["D", "Z"]),
            Err(TreeError::EmptyResult { remaining: 1 })
        ));
    }

    #[test]
    fn extract() {
        let tree = Tree::from_newick("(((A:1,B:1)AB:1,C:2):0.5,(D:1,E:1):1);").unwrap();
        let abc = tree.mrca(&["A", "C"]).unwrap();

        assert_eq!(
            newick(&tree.extract_clade(&abc).unwrap()),
            "((A:1,B:1)AB:1,C:2);"
        );
        assert!(matches!(
            tree.extract_clade(&1),
            Err(TreeError::NotInternalNode(1))
        ));
        assert!(matches!(
            tree.extract_clade(&42),
            Err(TreeError::UnknownNode(42))
        ));
    }

    #[test]
    fn ordered_resolution() {
        let tree = Tree::from_newick("(A,B,C,D);").unwrap();
        let resolved = tree.resolve_polytomies(Resolution::Ordered).unwrap();

        assert_eq!(newick(&resolved), "(((A,B),C),D);");
        assert_eq!(
            resolved.resolve_polytomies(Resolution::Ordered).unwrap(),
            resolved
        );

        let binary = Tree::from_newick(SCENARIO).unwrap();
        assert_eq!(
            binary.resolve_polytomies(Resolution::Ordered).unwrap(),
            binary
        );

        let weighted = Tree::from_newick("(A:1,B:1,C:1);").unwrap();
        assert_eq!(
            newick(&weighted.resolve_polytomies(Resolution::Ordered).unwrap()),
            "((A:1,B:1):0,C:1);"
        );
    }

    #[test]
    fn random_resolution() {
        let tree = Tree::from_newick("((A,B,C,D,E),(F,G,H),I);").unwrap();

        let mut rng = StdRng::seed_from_u64(1234);
        let first = tree.resolve_polytomies(Resolution::Random(&mut rng)).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);
        let second = tree.resolve_polytomies(Resolution::Random(&mut rng)).unwrap();

        assert!(first.is_binary());
        assert_eq!(first.n_internal(), first.n_tips() - 1);
        assert_eq!(first, second);

        let tips = |t: &Tree| -> BTreeSet<String> {
            t.tip_labels().into_iter().map(String::from).collect()
        };
        assert_eq!(tips(&first), tips(&tree));

        // Clades of the input are preserved
        let fgh = first.mrca(&["F", "G", "H"]).unwrap();
        assert_eq!(first.descendant_tips(&fgh).unwrap().len(), 3);
    }

    #[test]
    fn bind_positions() {
        let host = Tree::from_newick("((A,B),C);").unwrap();
        let graft = Tree::from_newick("(X,Y);").unwrap();

        let ab = host.mrca(&["A", "B"]).unwrap();
        assert_eq!(newick(&host.bind(&graft, &ab).unwrap()), "((A,B,(X,Y)),C);");
        assert_eq!(newick(&host.bind(&graft, &3).unwrap()), "((A,B),(C,(X,Y)));");
        assert_eq!(
            newick(&host.bind(&graft, &host.root()).unwrap()),
            "(((A,B),C),(X,Y));"
        );
        assert!(matches!(
            host.bind(&graft, &9),
            Err(TreeError::UnknownNode(9))
        ));
    }

    #[test]
    fn bind_with_branch_lengths() {
        let host = Tree::from_newick("((A:1,B:1):1,C:2);").unwrap();

        let graft = Tree::from_newick("(X:1,Y:1):0.5;").unwrap();
        assert_eq!(
            newick(&host.bind(&graft, &3).unwrap()),
            "((A:1,B:1):1,(C:0,(X:1,Y:1):0.5):2);"
        );

        let graft = Tree::from_newick("(X:1,Y:1);").unwrap();
        assert_eq!(
            newick(&host.bind(&graft, &host.root()).unwrap()),
            "(((A:1,B:1):1,C:2):0,(X:1,Y:1):0);"
        );
    }

    #[test]
    fn bind_simulated_trees() {
        let mut rng = StdRng::seed_from_u64(7);
        let host = generate_tree(10, TreeShape::Yule, None, &mut rng).unwrap();

        let mut table = generate_tree(10, TreeShape::Uniform, None, &mut rng)
            .unwrap()
            .edge_table();
        table.tips = table.tips.iter().map(|label| format!("g{label}")).collect();
        let graft = Tree::from_edge_table(&table).unwrap();

        let bound = host.bind(&graft, &1).unwrap();
        assert_eq!(bound.n_tips(), 20);
        let labels: BTreeSet<_> = bound.tip_labels().into_iter().collect();
        assert_eq!(labels.len(), 20);

        let clone = host.clone();
        assert!(matches!(
            host.bind(&clone, &1),
            Err(TreeError::DuplicateTipLabel(_))
        ));
    }

    #[test]
    fn ladderize_is_stable() {
        let tree = Tree::from_newick("((C,D),(A,B),E);").unwrap();
        assert_eq!(newick(&tree.ladderize().unwrap()), "(E,(C,D),(A,B));");
    }
}

use serde::{Deserialize, Serialize};

use super::builder::TreeBuilder;
use super::node::Node;
use super::tree_impl::{malformed, TopologyDefect, Tree, TreeError};
use super::{EdgeLength, NodeId};

/// A flat description of a rooted tree: tip labels, a count of internal
/// nodes and a list of `(parent, child)` edges.
///
/// Node ids follow the [`Tree`] convention: tips are `1..=tips.len()`, tip
/// `i` is labelled `tips[i - 1]`, internal nodes follow and the root is
/// `tips.len() + 1`.
///
/// ```
/// use phylokit::tree::{EdgeTable, Tree};
///
/// let tree = Tree::from_newick("((A:1,B:2):0.5,C:3);").unwrap();
/// let table = tree.edge_table();
///
/// assert_eq!(table.tips, vec!["A", "B", "C"]);
/// assert_eq!(table.n_internal, 2);
/// assert_eq!(table.edges, vec![(4, 5), (5, 1), (5, 2), (4, 3)]);
/// assert_eq!(table.edge_lengths, Some(vec![0.5, 1.0, 2.0, 3.0]));
///
/// assert_eq!(Tree::from_edge_table(&table).unwrap(), tree);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTable {
    /// Tip labels, in tip id order
    pub tips: Vec<String>,
    /// Number of internal nodes, the root included
    pub n_internal: usize,
    /// `(parent, child)` pairs
    pub edges: Vec<(NodeId, NodeId)>,
    /// Lengths aligned with `edges`, absent for unweighted trees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_lengths: Option<Vec<EdgeLength>>,
    /// Labels of the internal nodes in id order, may be left empty
    #[serde(default)]
    pub node_labels: Vec<Option<String>>,
    /// Length of the edge above the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_edge: Option<EdgeLength>,
}

impl Tree {
    /// Exports the tree as an [`EdgeTable`], edges listed in preorder.
    pub fn edge_table(&self) -> EdgeTable {
        EdgeTable {
            tips: self.tip_labels().into_iter().map(String::from).collect(),
            n_internal: self.n_internal(),
            edges: self.edges(),
            edge_lengths: self.edge_lengths(),
            node_labels: self.nodes()[self.n_tips()..]
                .iter()
                .map(|node| node.name.clone())
                .collect(),
            root_edge: self.root_edge(),
        }
    }

    /// Builds a tree from an [`EdgeTable`].
    ///
    /// The table must describe a single rooted tree over the nodes
    /// `1..=tips.len() + n_internal` that respects the numbering convention.
    /// Edges may be listed in any order, the order of the children of a node
    /// is the order in which its edges appear. The returned tree is
    /// renumbered canonically.
    pub fn from_edge_table(table: &EdgeTable) -> Result<Self, TreeError> {
        let n_tips = table.tips.len();
        let total = n_tips + table.n_internal;

        if n_tips == 0 {
            return Err(malformed(0, TopologyDefect::Empty));
        }
        if table.n_internal == 0 {
            return Err(malformed(0, TopologyDefect::NoInternalNode));
        }
        if let Some(lengths) = &table.edge_lengths {
            if lengths.len() != table.edges.len() {
                return Err(malformed(
                    lengths.len().min(table.edges.len()),
                    TopologyDefect::LengthMismatch {
                        edges: table.edges.len(),
                        lengths: lengths.len(),
                    },
                ));
            }
        }
        if !table.node_labels.is_empty() && table.node_labels.len() != table.n_internal {
            return Err(malformed(
                0,
                TopologyDefect::LabelMismatch {
                    internal: table.n_internal,
                    labels: table.node_labels.len(),
                },
            ));
        }

        // Arena slot i holds node i, slot 0 is unused
        let mut builder = TreeBuilder::new();
        let placeholder = builder.add(Node::new());
        for label in table.tips.iter() {
            builder.add(Node::new_named(label));
        }
        for i in 0..table.n_internal {
            let mut node = Node::new();
            node.name = table.node_labels.get(i).cloned().flatten();
            builder.add(node);
        }
        builder.delete_subtree(&placeholder)?;

        for (position, &(parent, child)) in table.edges.iter().enumerate() {
            for node in [parent, child] {
                if node == 0 || node > total {
                    return Err(malformed(
                        position,
                        TopologyDefect::NodeOutOfRange { node, max: total },
                    ));
                }
            }
            let length = match &table.edge_lengths {
                Some(lengths) => {
                    let length = lengths[position];
                    if !(length.is_finite() && length >= 0.0) {
                        return Err(malformed(position, TopologyDefect::NegativeLength(length)));
                    }
                    Some(length)
                }
                None => None,
            };

            let node = builder.get_mut(&child)?;
            if node.parent.is_some() {
                return Err(malformed(position, TopologyDefect::MultipleParents(child)));
            }
            node.set_parent(parent, length);
            builder.get_mut(&parent)?.add_child(child);
        }

        for id in 1..=total {
            let node = builder.get(&id)?;
            if id <= n_tips && !node.is_tip() {
                return Err(malformed(id, TopologyDefect::TipWithChildren(id)));
            }
            if id > n_tips && node.is_tip() {
                return Err(malformed(id, TopologyDefect::InternalWithoutChildren(id)));
            }
        }

        let root = n_tips + 1;
        let roots: Vec<_> = (1..=total)
            .filter(|id| builder.get(id).map(Node::is_root).unwrap_or(false))
            .collect();
        if let [found] = roots.as_slice() {
            if *found != root {
                return Err(malformed(
                    *found,
                    TopologyDefect::MisplacedRoot {
                        expected: root,
                        found: *found,
                    },
                ));
            }
        }
        if let Ok(node) = builder.get_mut(&root) {
            if node.is_root() {
                node.parent_edge = table.root_edge;
            }
        }

        builder.build()
    }
}

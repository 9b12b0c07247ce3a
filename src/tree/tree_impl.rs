use fixedbitset::FixedBitSet;
use itertools::Itertools;
use log::debug;
use ptree::{print_tree, TreeBuilder as PrintBuilder};
use std::collections::VecDeque;
use std::fmt::Display;
use std::iter::zip;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs,
    path::Path,
};

use thiserror::Error;

use super::builder::TreeBuilder;
use crate::distr::Distr;
use super::node::Node;
use super::{EdgeLength, NewickFormat, NodeId};

/// The different ways in which a tree description can be malformed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyDefect {
    /// There is nothing to build a tree from
    #[error("the tree is empty")]
    Empty,
    /// There is an unclosed bracket in the newick String
    #[error("missing a closing bracket")]
    UnclosedBracket,
    /// A closing bracket has no matching opening bracket
    #[error("closing bracket without a matching opening bracket")]
    UnmatchedClosingBracket,
    /// A subtree starts right after a label or a closed subtree
    #[error("unexpected opening bracket")]
    UnexpectedOpeningBracket,
    /// A sibling or a subtree was found after the root clade was closed
    #[error("found a node outside of the root clade")]
    OutsideRootClade,
    /// The newick string is missing a final semi-colon
    #[error("the tree is missing a semicolon at the end")]
    NoClosingSemicolon,
    /// Something other than whitespace follows the final semi-colon
    #[error("unexpected characters after the closing semicolon")]
    TrailingCharacters,
    /// There is whitespace in one of the branch lengths
    #[error("cannot have whitespace in number field")]
    WhiteSpaceInNumber,
    /// A node is given more than one branch length
    #[error("found a second branch length for the same node")]
    MultipleLengths,
    /// An unquoted label is split by whitespace or a comment
    #[error("labels cannot contain whitespace or comments unless quoted")]
    InterruptedLabel,
    /// A branch length is not a number
    #[error("could not parse branch length {0:?}")]
    InvalidLength(String),
    /// A branch length is negative or not finite
    #[error("branch length {0} is not a non-negative finite number")]
    NegativeLength(EdgeLength),
    /// A tip has no label
    #[error("all tips must be labelled")]
    UnnamedTip,
    /// Some of the tips share the same label
    #[error("tip label {0:?} is used more than once")]
    DuplicateTipLabel(String),
    /// The tree is made of a single node
    #[error("the tree has no internal node")]
    NoInternalNode,
    /// Every node has a parent
    #[error("no root node found")]
    NoRoot,
    /// Several nodes have no parent
    #[error("several root nodes found: {0:?}")]
    MultipleRoots(Vec<NodeId>),
    /// A node is the child of more than one node
    #[error("node {0} has more than one parent")]
    MultipleParents(NodeId),
    /// A node cannot be reached from the root
    #[error("node {0} is not connected to the root")]
    Disconnected(NodeId),
    /// A node is listed as a child but its parent link points elsewhere
    #[error("node {node} is a child of node {parent} but does not point back to it")]
    ParentMismatch {
        /// Id of the child
        node: NodeId,
        /// Id of the node listing it as a child
        parent: NodeId,
    },
    /// A node could not be spliced out since it does not have exactly one child
    #[error("node {0} does not have exactly one child")]
    NotUnary(NodeId),
    /// An edge references a node outside of the declared range
    #[error("node {node} is outside of the range 1..={max}")]
    NodeOutOfRange {
        /// Offending node id
        node: NodeId,
        /// Largest valid node id
        max: NodeId,
    },
    /// A node numbered as a tip has children
    #[error("node {0} is numbered as a tip but has children")]
    TipWithChildren(NodeId),
    /// A node numbered as an internal node has no children
    #[error("node {0} is numbered as an internal node but has no children")]
    InternalWithoutChildren(NodeId),
    /// The root is not the first internal node
    #[error("the root must be node {expected}, found {found}")]
    MisplacedRoot {
        /// Id the root should have
        expected: NodeId,
        /// Id of the node that has no parent
        found: NodeId,
    },
    /// Edges and edge lengths are not aligned
    #[error("{lengths} edge lengths given for {edges} edges")]
    LengthMismatch {
        /// Number of edges
        edges: usize,
        /// Number of edge lengths
        lengths: usize,
    },
    /// Internal node labels do not match the number of internal nodes
    #[error("{labels} node labels given for {internal} internal nodes")]
    LabelMismatch {
        /// Number of internal nodes
        internal: usize,
        /// Number of labels
        labels: usize,
    },
}

/// Errors that can occur when reading, writing and manipulating [`Tree`] structs.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree description does not form a valid rooted tree. The position is
    /// a byte offset for newick strings, an edge or node index otherwise.
    #[error("Malformed topology at position {position}: {defect}")]
    MalformedTopology {
        /// Where the problem was detected
        position: usize,
        /// What is wrong
        defect: TopologyDefect,
    },
    /// Trying to simulate a tree with too few tips
    #[error("Cannot generate a tree with {0} tips, at least 2 are needed.")]
    InvalidTipCount(usize),
    /// The parameters of a branch length distribution were rejected
    #[error("Invalid parameters for the {0:?} branch length distribution.")]
    InvalidDistribution(Distr),
    /// The requested node with index [`NodeId`] does not exist in the tree
    #[error("There is no node with index: {0}")]
    UnknownNode(NodeId),
    /// The tip set is empty (`None`) or contains a label that is not in the tree
    #[error("{}", disjoint_message(.0))]
    DisjointTipSet(Option<String>),
    /// The node does not have exactly two children
    #[error("Node {node} has {children} children, exactly 2 are needed.")]
    NotBinaryNode {
        /// Id of the node
        node: NodeId,
        /// Number of children of the node
        children: usize,
    },
    /// The node is a tip and we are trying to do something only possible on internal nodes
    #[error("Node {0} is not an internal node.")]
    NotInternalNode(NodeId),
    /// The edit would leave a tree with fewer than 2 tips
    #[error("The resulting tree would have {remaining} tip(s), at least 2 are needed.")]
    EmptyResult {
        /// Number of tips that would be left
        remaining: usize,
    },
    /// Two trees that are combined share a tip label
    #[error("Tip label {0:?} is present in both trees.")]
    DuplicateTipLabel(String),
    /// Some branches of the tree have no length
    #[error("The tree must have all branch lengths.")]
    MissingBranchLengths,
    /// An error occured on one tree of a collection
    #[error("Tree {index} of the collection: {source}")]
    InCollection {
        /// Index of the tree in the collection
        index: usize,
        /// The underlying error
        source: Box<TreeError>,
    },
    /// There was a [`std::io::Error`] when reading or writing a tree
    #[error("Error reading or writing tree")]
    IoError(#[from] std::io::Error),
}

fn disjoint_message(label: &Option<String>) -> String {
    match label {
        Some(label) => format!("Tip {label:?} is not in the tree."),
        None => "The tip set is empty.".to_string(),
    }
}

pub(crate) fn malformed(position: usize, defect: TopologyDefect) -> TreeError {
    TreeError::MalformedTopology { position, defect }
}

/// A rooted phylogenetic tree.
///
/// A [`Tree`] is always canonical: tips are numbered `1..=T` from left to
/// right, internal nodes `T+1..` in preorder and the root is `T+1`. Edges are
/// listed in preorder of their child node. Trees are never edited in place:
/// structural edits return a new [`Tree`].
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    n_tips: usize,
    preorder: Vec<NodeId>,
    // position of each node in `preorder`, indexed by id - 1
    rank: Vec<usize>,
    tip_index: HashMap<String, NodeId>,
}

/// Base methods to get [`Node`] objects and labels from the [`Tree`].
///
/// ----
/// ----
impl Tree {
    // ###########################
    // # GETTING NODES AND TIPS  #
    // ###########################

    /// Assembles a tree from nodes that already follow the numbering convention.
    pub(crate) fn from_canonical(nodes: Vec<Node>, n_tips: usize) -> Self {
        let root = n_tips + 1;

        let mut preorder = Vec::with_capacity(nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            preorder.push(id);
            stack.extend(nodes[id - 1].children.iter().rev().copied());
        }

        let mut rank = vec![0; nodes.len()];
        for (position, id) in preorder.iter().enumerate() {
            rank[id - 1] = position;
        }

        let tip_index = nodes[..n_tips]
            .iter()
            .filter_map(|node| node.name.clone().map(|name| (name, node.id)))
            .collect();

        Self {
            nodes,
            n_tips,
            preorder,
            rank,
            tip_index,
        }
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a reference to a specific Node of the tree
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        match id.checked_sub(1).and_then(|idx| self.nodes.get(idx)) {
            Some(node) => Ok(node),
            None => Err(TreeError::UnknownNode(*id)),
        }
    }

    /// Get the id of the root node, which is always the first internal node.
    pub fn root(&self) -> NodeId {
        self.n_tips + 1
    }

    /// Get the id of a tip from its label
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B),C);").unwrap();
    /// assert_eq!(tree.tip_id("C"), Some(3));
    /// assert_eq!(tree.tip_id("D"), None);
    /// ```
    pub fn tip_id(&self, label: &str) -> Option<NodeId> {
        self.tip_index.get(label).copied()
    }

    /// Gets the first node, in id order, with a given name.
    /// Internal node labels need not be unique.
    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.name.as_deref() == Some(name))
    }

    /// Returns the tip labels, the label of tip `i` is at index `i - 1`.
    pub fn tip_labels(&self) -> Vec<&str> {
        self.nodes[..self.n_tips]
            .iter()
            .filter_map(|node| node.name.as_deref())
            .collect()
    }

    /// Returns the label of a node, if it has one
    pub fn node_label(&self, id: &NodeId) -> Result<Option<&str>, TreeError> {
        Ok(self.get(id)?.name.as_deref())
    }

    /// Sets or removes the label of an internal node.
    /// Tip labels identify the tips and cannot be changed this way.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("((A,B),C);").unwrap();
    /// tree.set_node_label(&5, Some("AB".into())).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), "((A,B)AB,C);");
    /// assert!(tree.set_node_label(&1, None).is_err());
    /// ```
    pub fn set_node_label(&mut self, id: &NodeId, label: Option<String>) -> Result<(), TreeError> {
        if self.is_tip(id)? {
            return Err(TreeError::NotInternalNode(*id));
        }
        self.nodes[id - 1].name = label;

        Ok(())
    }

    /// Returns the children of a node, in display order
    pub fn children(&self, id: &NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.get(id)?.children)
    }

    /// Returns the parent of a node, `None` for the root
    pub fn parent(&self, id: &NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.get(id)?.parent)
    }

    /// Checks if a node is a tip
    pub fn is_tip(&self, id: &NodeId) -> Result<bool, TreeError> {
        self.get(id)?;
        Ok(*id <= self.n_tips)
    }

    /// Gets the node ids of all the nodes in the subtree rooted at the specified node, except the root
    pub fn get_descendants(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self.preorder(root)?.into_iter().skip(1).collect())
    }
}

/// Methods to traverse the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // ###################
    // # TREE TRAVERSALS #
    // ###################

    /// Returns a vector containing node ids in the same order as the
    /// [preorder](https://en.wikipedia.org/wiki/Tree_traversal#Pre-order,_NLR) tree traversal
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let preorder: Vec<_> = tree.preorder(&tree.root())
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().name.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(preorder, vec!["F", "B", "A", "D", "C", "E", "G", "I", "H"])
    /// ```
    pub fn preorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.get(root)?;
        // Subtrees are contiguous in the cached preorder
        let start = self.rank[root - 1];
        let end = start + self.subtree_size(root);

        Ok(self.preorder[start..end].to_vec())
    }

    fn subtree_size(&self, root: &NodeId) -> usize {
        let mut size = 0;
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            size += 1;
            stack.extend(self.nodes[id - 1].children.iter().copied());
        }
        size
    }

    /// Returns a vector containing node ids in the same order as the
    /// [postorder](https://en.wikipedia.org/wiki/Tree_traversal#Post-order,_LRN ) tree traversal
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let postorder: Vec<_> = tree.postorder(&tree.root())
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().name.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(postorder, vec!["A", "C", "E", "D", "B", "H", "I", "G", "F"])
    /// ```
    pub fn postorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.get(root)?;
        // Node, right to left children, then reversed
        let mut indices = vec![];
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            indices.push(id);
            stack.extend(self.nodes[id - 1].children.iter().copied());
        }
        indices.reverse();

        Ok(indices)
    }

    /// Returns a vector containing node ids in the same order as the
    /// [levelorder](https://en.wikipedia.org/wiki/Tree_traversal#Breadth-first_search) tree traversal
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let levelorder: Vec<_> = tree.levelorder(&tree.root())
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().name.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(levelorder, vec!["F", "B", "G", "A", "D", "I", "C", "E", "H"])
    /// ```
    pub fn levelorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.get(root)?;
        let mut indices = vec![];
        let mut queue = VecDeque::from([*root]);
        while let Some(id) = queue.pop_front() {
            indices.push(id);
            queue.extend(self.nodes[id - 1].children.iter().copied());
        }

        Ok(indices)
    }

    /// Returns the path from the root to the node
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let path: Vec<_> = tree.get_path_from_root(&tree.tip_id("E").unwrap())
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().name.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(path, vec!["F", "B", "D", "E"])
    /// ```
    pub fn get_path_from_root(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![];
        let mut current_node = *node;
        loop {
            path.push(current_node);
            match self.get(&current_node)?.parent {
                Some(parent) => current_node = parent,
                None => break,
            }
        }

        Ok(path.into_iter().rev().collect())
    }
}

/// Methods answering structural questions about clades of the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // ###################
    // # CLADE QUERIES   #
    // ###################

    /// Returns the labels of all the tips reachable from a node.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B),C),(D,E)),F);").unwrap();
    /// let abc = tree.mrca(&["A", "C"]).unwrap();
    ///
    /// let tips: Vec<_> = tree.descendant_tips(&abc).unwrap().into_iter().collect();
    /// assert_eq!(tips, vec!["A", "B", "C"]);
    /// ```
    pub fn descendant_tips(&self, node: &NodeId) -> Result<BTreeSet<String>, TreeError> {
        Ok(self
            .preorder(node)?
            .into_iter()
            .filter(|id| *id <= self.n_tips)
            .filter_map(|id| self.nodes[id - 1].name.clone())
            .collect())
    }

    /// Resolves tip labels to tip ids, failing on the first unknown label.
    fn resolve_tips<S: AsRef<str>>(&self, tips: &[S]) -> Result<Vec<NodeId>, TreeError> {
        if tips.is_empty() {
            return Err(TreeError::DisjointTipSet(None));
        }

        tips.iter()
            .map(|label| {
                self.tip_id(label.as_ref())
                    .ok_or_else(|| TreeError::DisjointTipSet(Some(label.as_ref().to_string())))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|ids| ids.into_iter().unique().collect())
    }

    /// Gets the most recent common ancestor between two tree nodes
    pub fn get_common_ancestor(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<NodeId, TreeError> {
        if source == target {
            return Ok(*source);
        }
        let root_to_source = self.get_path_from_root(source)?;
        let root_to_target = self.get_path_from_root(target)?;

        let cursor = zip(root_to_source.iter(), root_to_target.iter())
            .position(|(s, t)| s != t)
            .unwrap_or_else(|| {
                // One node is an ancestor of the other
                root_to_source.len().min(root_to_target.len())
            });

        Ok(root_to_source[cursor - 1])
    }

    /// Gets the most recent common ancestor of a set of tips: the deepest
    /// internal node that is an ancestor of all of them. For a single tip
    /// this is its parent.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B),C),(D,E)),F);").unwrap();
    ///
    /// assert_eq!(tree.mrca(&["A", "B"]).unwrap(), 10);
    /// assert_eq!(tree.mrca(&["B", "D"]).unwrap(), 8);
    /// assert_eq!(tree.mrca(&["C"]).unwrap(), 9);
    /// assert!(tree.mrca(&["A", "Z"]).is_err());
    /// ```
    pub fn mrca<S: AsRef<str>>(&self, tips: &[S]) -> Result<NodeId, TreeError> {
        let ids = self.resolve_tips(tips)?;

        if let [tip] = ids.as_slice() {
            return self.get(tip)?.parent.ok_or(TreeError::UnknownNode(*tip));
        }

        let mut ancestor = ids[0];
        for id in ids.iter().skip(1) {
            ancestor = self.get_common_ancestor(&ancestor, id)?;
        }

        Ok(ancestor)
    }

    /// Returns the index in [`Tree::edges`] of the edge leading to a node,
    /// `None` for the root.
    pub fn edge_index(&self, node: &NodeId) -> Result<Option<usize>, TreeError> {
        self.get(node)?;
        Ok(self.rank[node - 1].checked_sub(1))
    }

    /// Returns the indices, in increasing order, of the edges on the paths
    /// between a set of tips and their most recent common ancestor. For a
    /// clade this is every edge below its ancestor.
    /// A single tip yields the edge leading to it.
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((((A,B),C),(D,E)),F);").unwrap();
    /// let edges = tree.edges_within_clade(&["A", "B", "C"]).unwrap();
    ///
    /// assert_eq!(edges, vec![2, 3, 4, 5]);
    /// assert_eq!(tree.edges()[2], (9, 10));
    /// ```
    pub fn edges_within_clade<S: AsRef<str>>(&self, tips: &[S]) -> Result<Vec<usize>, TreeError> {
        let ids = self.resolve_tips(tips)?;
        let mut selected = FixedBitSet::with_capacity(self.n_edges());

        if let [tip] = ids.as_slice() {
            selected.extend(self.edge_index(tip)?);
        } else {
            let ancestor = self.mrca(tips)?;
            for id in ids {
                let mut current = id;
                while current != ancestor {
                    selected.extend(self.edge_index(&current)?);
                    current = self.get(&current)?.parent.ok_or(TreeError::UnknownNode(current))?;
                }
            }
        }

        Ok(selected.ones().collect())
    }

    /// Returns the `(parent, child)` pairs of the tree, in preorder of the child.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.preorder
            .iter()
            .skip(1)
            .filter_map(|child| self.nodes[child - 1].parent.map(|parent| (parent, *child)))
            .collect()
    }

    /// Returns the edge lengths aligned with [`Tree::edges`],
    /// or `None` if any edge is missing a length.
    pub fn edge_lengths(&self) -> Option<Vec<EdgeLength>> {
        self.preorder
            .iter()
            .skip(1)
            .map(|child| self.nodes[child - 1].parent_edge)
            .collect()
    }
}

/// Methods that compute characteristics and measures to describe the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // #######################################
    // # GETTING CHARACTERISTICS OF THE TREE #
    // #######################################

    /// Returns the number of nodes in the tree
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of tips in the tree
    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    /// Returns the number of internal nodes in the tree, the root included
    pub fn n_internal(&self) -> usize {
        self.nodes.len() - self.n_tips
    }

    /// Returns the number of edges in the tree
    pub fn n_edges(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Check if the tree is binary, i.e. if every internal node has exactly 2 children
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// assert!(Tree::from_newick("((A,B),C);").unwrap().is_binary());
    /// assert!(!Tree::from_newick("(A,B,C);").unwrap().is_binary());
    /// assert!(!Tree::from_newick("((A,B));").unwrap().is_binary());
    /// ```
    pub fn is_binary(&self) -> bool {
        self.nodes[self.n_tips..]
            .iter()
            .all(|node| node.children.len() == 2)
    }

    /// Checks if every edge of the tree has a length
    pub fn has_branch_lengths(&self) -> bool {
        self.nodes
            .iter()
            .filter(|node| !node.is_root())
            .all(|node| node.parent_edge.is_some())
    }

    /// Length of the edge above the root, if any
    pub fn root_edge(&self) -> Option<EdgeLength> {
        self.nodes[self.n_tips].parent_edge
    }

    /// Returns the height of the tree
    /// (i.e. the number of edges or branch length sum from the root to the deepest tip)
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A:0.1,B:0.2)G:0.1,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// assert_eq!(tree.height(), 0.9);
    ///
    /// let tree_no_brlen = Tree::from_newick("((A,B)G,(C,D)E)F;").unwrap();
    /// assert_eq!(tree_no_brlen.height(), 2.);
    /// ```
    pub fn height(&self) -> EdgeLength {
        let lengths = self.has_branch_lengths();
        let mut depths = vec![0.0; self.nodes.len()];
        for id in self.preorder.iter().skip(1) {
            let node = &self.nodes[id - 1];
            let parent = node.parent.map(|p| depths[p - 1]).unwrap_or_default();
            let edge = if lengths {
                node.parent_edge.unwrap_or_default()
            } else {
                1.0
            };
            depths[id - 1] = parent + edge;
        }

        depths[..self.n_tips]
            .iter()
            .copied()
            .fold(0.0, EdgeLength::max)
    }

    /// Returns the length of the tree
    /// (i.e. the sum of branch lengths, root edge excluded)
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.5,B:0.25,(C:0.125,D:0.375)E:0.25)F;").unwrap();
    /// assert_eq!(tree.length().unwrap(), 1.5);
    /// ```
    pub fn length(&self) -> Result<EdgeLength, TreeError> {
        match self.edge_lengths() {
            Some(v) => Ok(v.iter().sum()),
            None => Err(TreeError::MissingBranchLengths),
        }
    }
}

/// Methods to read and write [`Tree`] objects to and from files or [`String`] objects.
///
/// ----
/// ----
impl Tree {
    // ########################
    // # READ AND WRITE TREES #
    // ########################

    /// Generate newick representation of tree
    fn to_newick_impl(&self, root: &NodeId, format: NewickFormat) -> Result<String, TreeError> {
        let mut newick = String::new();
        let mut stack = vec![Visit::Enter(*root)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    let node = self.get(&id)?;
                    if node.children.is_empty() {
                        newick += &node.to_newick(format);
                    } else {
                        newick.push('(');
                        stack.push(Visit::Leave(id));
                        for (i, child) in node.children.iter().enumerate().rev() {
                            stack.push(Visit::Enter(*child));
                            if i > 0 {
                                stack.push(Visit::Sibling);
                            }
                        }
                    }
                }
                Visit::Sibling => newick.push(','),
                Visit::Leave(id) => {
                    newick.push(')');
                    newick += &self.get(&id)?.to_newick(format);
                }
            }
        }

        Ok(newick)
    }

    /// Writes the tree as a newick formatted string
    /// # Example
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F:0.6;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), newick);
    /// ```
    pub fn to_newick(&self) -> Result<String, TreeError> {
        self.to_formatted_newick(NewickFormat::AllFields)
    }

    /// Writes the tree as a newick formatted string with a specified
    /// output format from [`NewickFormat`].
    /// # Example
    /// ```
    /// use phylokit::tree::{Tree, NewickFormat};
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F:0.6;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(
    ///     tree.to_formatted_newick(NewickFormat::OnlyNames).unwrap(),
    ///     "(A,B,(C,D)E)F;"
    /// );
    /// assert_eq!(
    ///     tree.to_formatted_newick(NewickFormat::AllLengthsLeafNames).unwrap(),
    ///     "(A:0.1,B:0.2,(C:0.3,D:0.4):0.5):0.6;"
    /// );
    /// ```
    pub fn to_formatted_newick(&self, format: NewickFormat) -> Result<String, TreeError> {
        Ok(self.to_newick_impl(&self.root(), format)? + ";")
    }

    /// Read a newick formatted string and build a [`Tree`] struct from it.
    /// # Example
    /// ```
    /// use phylokit::tree::Tree;
    ///
    /// let newick = "((((A,B), C), (D,E)),F);";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.n_tips(), 6);
    /// assert_eq!(tree.n_internal(), 5);
    /// assert_eq!(tree.edges().len(), 10);
    /// ```
    pub fn from_newick(newick: &str) -> Result<Self, TreeError> {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Field {
            Name,
            Length,
            Comment,
        }

        let mut builder = TreeBuilder::new();

        let mut parsing = Field::Name;
        // Field to go back to when a comment closes
        let mut resume = Field::Name;
        let mut current_name: Option<String> = None;
        let mut current_length: Option<String> = None;
        let mut current_comment: Option<String> = None;
        // Closed subtree waiting for its label and length
        let mut current_index: Option<NodeId> = None;
        let mut parent_stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        let mut within_quotes = false;
        // Whitespace or a comment ended the name or length being read
        let mut interrupted = false;
        let mut tip_labels = HashSet::new();

        for (position, c) in newick.char_indices() {
            // Add character in quotes to name
            if within_quotes && parsing == Field::Name && c != '"' {
                current_name.get_or_insert_with(String::new).push(c);
                continue;
            }

            // Add current character to comment
            if parsing == Field::Comment && c != ']' {
                current_comment.get_or_insert_with(String::new).push(c);
                continue;
            }

            let field_started = match parsing {
                Field::Name => current_name.is_some(),
                Field::Length => current_length.is_some(),
                Field::Comment => false,
            };

            // Skip unquoted whitespace
            if c.is_whitespace() && !within_quotes {
                interrupted |= field_started;
                continue;
            }

            match c {
                '"' => {
                    // Enter or close quoted section (name)
                    within_quotes = !within_quotes;
                    if parsing == Field::Name {
                        if interrupted {
                            return Err(malformed(position, TopologyDefect::InterruptedLabel));
                        }
                        current_name.get_or_insert_with(String::new).push(c);
                    }
                }
                '[' => {
                    interrupted |= field_started;
                    resume = parsing;
                    parsing = Field::Comment;
                }
                ']' => {
                    if parsing == Field::Comment {
                        parsing = resume;
                    }
                }
                '(' => {
                    // Start subtree
                    if current_index.is_some() || current_name.is_some() || current_length.is_some()
                    {
                        return Err(malformed(position, TopologyDefect::UnexpectedOpeningBracket));
                    }
                    let node = match parent_stack.last() {
                        Some(parent) => builder.add_child(Node::new(), *parent, None)?,
                        None if root.is_none() => {
                            let id = builder.add(Node::new());
                            root = Some(id);
                            id
                        }
                        None => return Err(malformed(position, TopologyDefect::OutsideRootClade)),
                    };
                    parent_stack.push(node);
                }
                ':' => {
                    // Start parsing length
                    if parsing == Field::Length || current_length.is_some() {
                        return Err(malformed(position, TopologyDefect::MultipleLengths));
                    }
                    parsing = Field::Length;
                    interrupted = false;
                }
                ',' | ')' => {
                    // Close the current node, then add a sibling or close the subtree
                    let Some(&parent) = parent_stack.last() else {
                        let defect = if c == ',' {
                            TopologyDefect::OutsideRootClade
                        } else {
                            TopologyDefect::UnmatchedClosingBracket
                        };
                        return Err(malformed(position, defect));
                    };

                    let id = match current_index.take() {
                        Some(id) => id,
                        None => {
                            match current_name.as_deref() {
                                None | Some("") => {
                                    return Err(malformed(position, TopologyDefect::UnnamedTip))
                                }
                                Some(label) if !tip_labels.insert(label.to_string()) => {
                                    return Err(malformed(
                                        position,
                                        TopologyDefect::DuplicateTipLabel(label.to_string()),
                                    ))
                                }
                                _ => (),
                            }
                            builder.add_child(Node::new(), parent, None)?
                        }
                    };

                    finish_node(
                        builder.get_mut(&id)?,
                        current_name.take(),
                        current_length.take(),
                        current_comment.take(),
                        position,
                    )?;

                    parsing = Field::Name;
                    interrupted = false;

                    if c == ')' {
                        current_index = parent_stack.pop();
                    }
                }
                ';' => {
                    // Finish parsing the Tree
                    if !parent_stack.is_empty() {
                        return Err(malformed(position, TopologyDefect::UnclosedBracket));
                    }
                    let Some(id) = current_index.take() else {
                        let defect = if current_name.is_some() {
                            TopologyDefect::NoInternalNode
                        } else {
                            TopologyDefect::Empty
                        };
                        return Err(malformed(position, defect));
                    };

                    finish_node(
                        builder.get_mut(&id)?,
                        current_name.take(),
                        current_length.take(),
                        current_comment.take(),
                        position,
                    )?;

                    let rest = &newick[position + c.len_utf8()..];
                    if let Some(offset) = rest.find(|c: char| !c.is_whitespace()) {
                        return Err(malformed(
                            position + c.len_utf8() + offset,
                            TopologyDefect::TrailingCharacters,
                        ));
                    }

                    return builder.build();
                }
                _ => {
                    // Parse characters in fields
                    match parsing {
                        Field::Name => {
                            if interrupted {
                                return Err(malformed(position, TopologyDefect::InterruptedLabel));
                            }
                            current_name.get_or_insert_with(String::new).push(c)
                        }
                        Field::Length => {
                            if interrupted {
                                return Err(malformed(position, TopologyDefect::WhiteSpaceInNumber));
                            }
                            current_length.get_or_insert_with(String::new).push(c)
                        }
                        Field::Comment => (),
                    };
                }
            }
        }

        let defect = if parent_stack.is_empty() {
            TopologyDefect::NoClosingSemicolon
        } else {
            TopologyDefect::UnclosedBracket
        };
        Err(malformed(newick.len(), defect))
    }

    /// Writes the tree to a newick file
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        fs::write(path, self.to_newick()?)?;
        Ok(())
    }

    /// Creates a tree from a newick file
    pub fn from_file(path: &Path) -> Result<Self, TreeError> {
        debug!("Reading tree from {path:?}");
        let newick_string = fs::read_to_string(path)?;
        Self::from_newick(&newick_string)
    }

    fn print_impl(&self, debug: bool) -> Result<(), TreeError> {
        let label = |node: &Node| {
            if debug {
                format!("{node:?}")
            } else {
                format!("{node}")
            }
        };

        let root = self.get(&self.root())?;
        let mut builder = PrintBuilder::new(label(root));
        let mut stack: Vec<_> = root.children.iter().rev().map(|c| Visit::Enter(*c)).collect();
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    let node = self.get(&id)?;
                    if node.children.is_empty() {
                        builder.add_empty_child(label(node));
                    } else {
                        builder.begin_child(label(node));
                        stack.push(Visit::Leave(id));
                        stack.extend(node.children.iter().rev().map(|c| Visit::Enter(*c)));
                    }
                }
                Visit::Leave(_) => {
                    builder.end_child();
                }
                Visit::Sibling => (),
            }
        }

        print_tree(&builder.build())?;
        Ok(())
    }

    /// Print a debug view of the tree to the console
    pub fn print_debug(&self) -> Result<(), TreeError> {
        self.print_impl(true)
    }

    /// Print the tree to the console
    pub fn print(&self) -> Result<(), TreeError> {
        self.print_impl(false)
    }
}

// Steps of an iterative depth first walk
enum Visit {
    Enter(NodeId),
    Sibling,
    Leave(NodeId),
}

// Sets the fields read after a node was opened or closed
fn finish_node(
    node: &mut Node,
    name: Option<String>,
    length: Option<String>,
    comment: Option<String>,
    position: usize,
) -> Result<(), TreeError> {
    if let Some(name) = name {
        node.set_name(name);
    }

    if let Some(length) = length {
        let value: EdgeLength = length
            .parse()
            .map_err(|_| malformed(position, TopologyDefect::InvalidLength(length.clone())))?;
        if !(value.is_finite() && value >= 0.0) {
            return Err(malformed(position, TopologyDefect::NegativeLength(value)));
        }
        node.parent_edge = Some(value);
    }

    node.comment = comment;

    Ok(())
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.n_tips == other.n_tips && self.nodes == other.nodes
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let newick = self.to_newick().map_err(|_| std::fmt::Error)?;
        write!(f, "{newick}")
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{generate_tree, TreeShape};

    const SCENARIO: &str = "((((A,B), C), (D,E)),F);";

    fn get_values(indices: &[usize], tree: &Tree) -> Vec<Option<String>> {
        indices
            .iter()
            .map(|idx| tree.get(idx).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn scenario_structure() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        assert_eq!(tree.n_tips(), 6);
        assert_eq!(tree.n_internal(), 5);
        assert_eq!(tree.n_edges(), 10);
        assert_eq!(tree.root(), 7);
        assert_eq!(tree.tip_labels(), vec!["A", "B", "C", "D", "E", "F"]);
        assert_eq!(
            tree.edges(),
            vec![
                (7, 8),
                (8, 9),
                (9, 10),
                (10, 1),
                (10, 2),
                (9, 3),
                (8, 11),
                (11, 4),
                (11, 5),
                (7, 6)
            ]
        );
        assert!(tree.is_binary());
        assert!(tree.edge_lengths().is_none());
    }

    #[test]
    fn scenario_clade_queries() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        let abc = tree.mrca(&["A", "B", "C"]).unwrap();
        assert_eq!(abc, 9);
        let tips: Vec<_> = tree.descendant_tips(&abc).unwrap().into_iter().collect();
        assert_eq!(tips, vec!["A", "B", "C"]);

        let edges = tree.edges_within_clade(&["A", "B", "C"]).unwrap();
        assert_eq!(edges.len(), 4);
        let pairs: Vec<_> = edges.iter().map(|e| tree.edges()[*e]).collect();
        assert_eq!(pairs, vec![(9, 10), (10, 1), (10, 2), (9, 3)]);
    }

    #[test]
    fn edges_of_non_monophyletic_sets() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        assert_eq!(
            tree.edges_within_clade(&["A", "D"]).unwrap(),
            vec![1, 2, 3, 6, 7]
        );
        assert_eq!(tree.edges_within_clade(&["F"]).unwrap(), vec![9]);
        assert_eq!(tree.edges_within_clade(&["A", "A", "B"]).unwrap(), vec![3, 4]);
    }

    #[test]
    fn mrca_of_descendants_is_node() {
        let tree = Tree::from_newick("((A,(C,E)D)B,(H,(I,J,K)L)G)F;").unwrap();
        for id in tree.n_tips() + 1..=tree.size() {
            let tips: Vec<_> = tree.descendant_tips(&id).unwrap().into_iter().collect();
            assert_eq!(tree.mrca(&tips).unwrap(), id);
        }
    }

    #[test]
    fn mrca_failures() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        let empty: [&str; 0] = [];

        assert!(matches!(
            tree.mrca(&empty),
            Err(TreeError::DisjointTipSet(None))
        ));
        assert!(matches!(
            tree.mrca(&["A", "Z"]),
            Err(TreeError::DisjointTipSet(Some(label))) if label == "Z"
        ));
        assert!(matches!(
            tree.edges_within_clade(&["Z"]),
            Err(TreeError::DisjointTipSet(Some(_)))
        ));
    }

    #[test]
    fn descendant_tips_of_tip_and_unknown() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        let tips: Vec<_> = tree.descendant_tips(&4).unwrap().into_iter().collect();
        assert_eq!(tips, vec!["D"]);
        assert!(matches!(
            tree.descendant_tips(&12),
            Err(TreeError::UnknownNode(12))
        ));
        assert!(matches!(
            tree.descendant_tips(&0),
            Err(TreeError::UnknownNode(0))
        ));
    }

    #[test]
    fn traversals() {
        let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
        let root = tree.root();

        let names = |ids: Vec<NodeId>| -> Vec<String> {
            get_values(&ids, &tree).into_iter().flatten().collect()
        };

        assert_eq!(
            names(tree.preorder(&root).unwrap()),
            vec!["F", "B", "A", "D", "C", "E", "G", "I", "H"]
        );
        assert_eq!(
            names(tree.postorder(&root).unwrap()),
            vec!["A", "C", "E", "D", "B", "H", "I", "G", "F"]
        );
        assert_eq!(
            names(tree.levelorder(&root).unwrap()),
            vec!["F", "B", "G", "A", "D", "I", "C", "E", "H"]
        );

        let d = tree.mrca(&["C", "E"]).unwrap();
        assert_eq!(names(tree.preorder(&d).unwrap()), vec!["D", "C", "E"]);
        assert_eq!(names(tree.get_descendants(&d).unwrap()), vec!["C", "E"]);
    }

    #[test]
    fn deep_caterpillar_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let tree = generate_tree(
            3000,
            TreeShape::Caterpillar,
            Some(Distr::Exponential),
            &mut rng,
        )
        .unwrap();

        let newick = tree.to_newick().unwrap();
        let read = Tree::from_newick(&newick).unwrap();
        assert_eq!(read, tree);
        assert_eq!(read.to_newick().unwrap(), newick);

        let postorder = tree.postorder(&tree.root()).unwrap();
        assert_eq!(postorder.len(), tree.size());
        assert_eq!(postorder.last(), Some(&tree.root()));

        let ladderized = tree.ladderize().unwrap();
        assert_eq!(ladderized.n_tips(), 3000);
        assert!(ladderized.is_binary());
    }

    #[test]
    fn last_common_ancestor() {
        let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
        let id = |name: &str| {
            tree.get_by_name(name)
                .unwrap_or_else(|| panic!("missing {name}"))
                .id
        };

        let test_cases = vec![
            (("A", "E"), "B"),
            (("C", "H"), "F"),
            (("A", "A"), "A"),
            (("H", "I"), "I"),
            (("D", "E"), "D"),
        ];
        for ((source, target), ancestor) in test_cases {
            assert_eq!(
                id(ancestor),
                tree.get_common_ancestor(&id(source), &id(target)).unwrap()
            );
        }
    }

    #[test]
    fn to_newick() {
        let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
        let tree = Tree::from_newick(newick).unwrap();

        assert_eq!(newick, tree.to_newick().unwrap());
        assert_eq!(format!("{tree}"), newick);
        assert_eq!(
            tree.to_formatted_newick(NewickFormat::OnlyNames).unwrap(),
            "(A,B,(C,D)E)F;"
        );
    }

    #[test]
    fn read_newick_whitespace_and_comments() {
        let tree = Tree::from_newick(" ( A : 0.5 [first], \"B C\":1.25 ) root ;\n").unwrap();

        assert_eq!(tree.tip_labels(), vec!["A", "\"B C\""]);
        assert_eq!(tree.get(&1).unwrap().comment, Some("first".into()));
        assert_eq!(tree.edge_lengths(), Some(vec![0.5, 1.25]));
        assert_eq!(tree.node_label(&3).unwrap(), Some("root"));
    }

    #[test]
    fn reparse_is_identical() {
        let cases = [
            SCENARIO,
            "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F:0.6;",
            "((A,(C,E)D)B,((H)I)G)F;",
            "(H,(A,(B,X,D)),Q,T,S,(U,Y));",
            "(((A[&&NHX:name=A],B[&&NHX:name=B])[&&NHX:name=NoName],C[&&NHX:name=C])[&&NHX:name=I],(D[&&NHX:name=D],F[&&NHX:name=F])[&&NHX:name=J])[&&NHX:name=root];",
            "(Ddi0002240:1.45747,Dme0014628:1.23513,(Aga0007658:1.75256,(Cin0011239:0.72821,(Fru0004507:0.184484,((Dre0008391:0,Dre0008390:0)1:0.002729,Dre0008392:0.010931)1:0.12242)1:0.14253)1:0.219467)1:0.317782[&&NHX:flag=White]);",
        ];

        for newick in cases {
            let tree = Tree::from_newick(newick).unwrap();
            let written = tree.to_newick().unwrap();
            let reparsed = Tree::from_newick(&written).unwrap();

            assert_eq!(tree, reparsed, "{newick}");
            assert_eq!(tree.edges(), reparsed.edges());
            assert_eq!(tree.tip_labels(), reparsed.tip_labels());
        }
    }

    #[test]
    fn read_newick_fails() {
        let cases = [
            ("((A,B),C;", TopologyDefect::UnclosedBracket),
            ("((A,B),C))", TopologyDefect::UnmatchedClosingBracket),
            ("((A,B),C)", TopologyDefect::NoClosingSemicolon),
            ("((A,B),C); (D,E);", TopologyDefect::TrailingCharacters),
            ("((A,B),A);", TopologyDefect::DuplicateTipLabel("A".into())),
            ("((A,),C);", TopologyDefect::UnnamedTip),
            ("(A:0.1 2,B);", TopologyDefect::WhiteSpaceInNumber),
            ("(A:x,B);", TopologyDefect::InvalidLength("x".into())),
            ("(A:1:2,B);", TopologyDefect::MultipleLengths),
            ("(A::2,B);", TopologyDefect::MultipleLengths),
            ("(A:1[c]:2,B);", TopologyDefect::MultipleLengths),
            ("(A:1[c]2,B);", TopologyDefect::WhiteSpaceInNumber),
            ("(A[c]B,C);", TopologyDefect::InterruptedLabel),
            ("(A B,C);", TopologyDefect::InterruptedLabel),
            ("(A,B)C [c] D;", TopologyDefect::InterruptedLabel),
            ("(A:-1,B);", TopologyDefect::NegativeLength(-1.0)),
            ("(A,B),(C,D);", TopologyDefect::OutsideRootClade),
            ("(A,B)C(D,E);", TopologyDefect::UnexpectedOpeningBracket),
            ("A;", TopologyDefect::NoInternalNode),
            (";", TopologyDefect::Empty),
        ];

        for (newick, expected) in cases {
            match Tree::from_newick(newick) {
                Err(TreeError::MalformedTopology { defect, .. }) => {
                    assert_eq!(defect, expected, "{newick}")
                }
                other => panic!("{newick} should fail, got {other:?}"),
            }
        }
    }

    #[test]
    fn error_positions() {
        match Tree::from_newick("((A,B),A);") {
            Err(TreeError::MalformedTopology { position, .. }) => assert_eq!(position, 8),
            other => panic!("unexpected {other:?}"),
        }
        match Tree::from_newick("(A,B);  x") {
            Err(TreeError::MalformedTopology { position, .. }) => assert_eq!(position, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_height_and_length() {
        let tree = Tree::from_newick("((A:1,B:2):0.5,C:1);").unwrap();
        assert_eq!(tree.height(), 2.5);
        assert_eq!(tree.length().unwrap(), 4.5);

        let tree = Tree::from_newick(SCENARIO).unwrap();
        assert_eq!(tree.height(), 4.0);
        assert!(matches!(
            tree.length(),
            Err(TreeError::MissingBranchLengths)
        ));
    }

    #[test]
    fn root_edge_is_kept() {
        let tree = Tree::from_newick("((A:1,B:1):1,C:2):0.25;").unwrap();

        assert_eq!(tree.root_edge(), Some(0.25));
        assert!(tree.has_branch_lengths());
        assert_eq!(tree.length().unwrap(), 5.0);
    }

    #[test]
    fn test_edge_index() {
        let tree = Tree::from_newick(SCENARIO).unwrap();

        assert_eq!(tree.edge_index(&7).unwrap(), None);
        for (index, (_, child)) in tree.edges().into_iter().enumerate() {
            assert_eq!(tree.edge_index(&child).unwrap(), Some(index));
        }
    }

    #[test]
    fn tree_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Tree>();
    }
}

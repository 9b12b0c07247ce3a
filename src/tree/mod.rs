//! Build, query and edit rooted phylogenetic trees.
//!
//! This module defines the essential structs to represent phylogenetic trees:
//!  - The [`Node`] struct that represents a node of a phylogenetic tree.
//!  - The [`Tree`] struct that holds a canonical collection of [`Node`] objects.
//!  - The [`TreeBuilder`] arena used to assemble or edit a tree before it is
//!    validated and renumbered into a [`Tree`].
//!  - The [`EdgeTable`] struct, a flat view of a [`Tree`] meant for external consumers.
//!
//! Node identifiers of a [`Tree`] follow a fixed convention: tips are numbered
//! `1..=T` from left to right, internal nodes `T+1..` in preorder, and the root
//! is always `T+1`.

mod builder;
mod edit;
mod node;
mod table;
mod tree_impl;

pub use self::builder::TreeBuilder;
pub use self::edit::Resolution;
pub use self::node::Node;
pub use self::table::EdgeTable;
pub use self::tree_impl::{TopologyDefect, Tree, TreeError};

/// A type that represents Identifiers of [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type NodeId = usize;

/// A type that represents branch lengths between [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type EdgeLength = f64;

/// Newick output format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NewickFormat {
    /// Output all supported and available fields
    AllFields,
    /// Output all fields except for comments
    NoComments,
    /// Output node names only
    OnlyNames,
    /// Output all branch lengths + leaf names
    AllLengthsLeafNames,
}

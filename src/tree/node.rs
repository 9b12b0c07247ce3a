use std::fmt::{Debug, Display};

use super::{EdgeLength, NewickFormat, NodeId};

#[derive(Clone)]
/// A node of the Tree
pub struct Node {
    /// Index of the node
    pub id: NodeId,
    /// Name of the node (taxon label for tips, optional label for internal nodes)
    pub name: Option<String>,
    /// Index of the parent node
    pub parent: Option<NodeId>,
    /// Indices of child nodes, in display order
    pub children: Vec<NodeId>,
    /// length of branch between parent and node.
    /// On the root this is the length of the root edge, if any.
    pub parent_edge: Option<EdgeLength>,
    /// Optional comment attached to node
    pub comment: Option<String>,
    // Whether the node is deleted or not
    pub(crate) deleted: bool,
}

impl Node {
    /// Creates a new Node
    pub fn new() -> Self {
        Self {
            id: 0,
            name: None,
            parent: None,
            children: vec![],
            parent_edge: None,
            comment: None,
            deleted: false,
        }
    }

    /// Creates a new named Node
    pub fn new_named(name: &str) -> Self {
        Self {
            name: Some(String::from(name)),
            ..Self::new()
        }
    }

    /// Sets the internal Node name
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Set the parent node and the length of the edge leading to it
    pub fn set_parent(&mut self, parent: NodeId, parent_edge: Option<EdgeLength>) {
        self.parent = Some(parent);
        self.parent_edge = parent_edge;
    }

    /// Empties the node and sets it as deleted
    pub(crate) fn delete(&mut self) {
        *self = Self::new();
        self.deleted = true;
    }

    /// Adds a child to the node
    /// ```
    /// use phylokit::tree::Node;
    ///
    /// let mut parent = Node::new();
    /// parent.add_child(4);
    /// parent.add_child(2);
    ///
    /// assert_eq!(parent.children, vec![4, 2]);
    /// assert!(!parent.is_tip());
    /// ```
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Removes the child from the node, returning the position it occupied
    pub fn remove_child(&mut self, child: &NodeId) -> Option<usize> {
        let position = self.children.iter().position(|node_id| node_id == child)?;
        self.children.remove(position);

        Some(position)
    }

    /// Puts `new` in place of `old` in the list of children, keeping its position.
    /// Returns `false` if `old` is not a child of this node.
    pub fn replace_child(&mut self, old: &NodeId, new: NodeId) -> bool {
        match self.children.iter_mut().find(|node_id| *node_id == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    /// Check if the node is a tip node
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    /// Check if the node is a root node
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    fn format_name(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    fn format_length(&self) -> String {
        self.parent_edge
            .map(|v| format!(":{v}"))
            .unwrap_or_default()
    }

    fn format_comment(&self) -> String {
        self.comment
            .clone()
            .map(|v| format!("[{v}]"))
            .unwrap_or_default()
    }

    /// Returns String with node in newick format
    /// ```
    /// use phylokit::tree::{Node, NewickFormat};
    ///
    /// let mut node = Node::new_named("A");
    /// node.set_parent(3, Some(0.5));
    /// node.comment = Some("&&NHX:S=human".into());
    ///
    /// assert_eq!(node.to_newick(NewickFormat::AllFields), "A:0.5[&&NHX:S=human]");
    /// assert_eq!(node.to_newick(NewickFormat::NoComments), "A:0.5");
    /// assert_eq!(node.to_newick(NewickFormat::OnlyNames), "A");
    /// ```
    pub fn to_newick(&self, format: NewickFormat) -> String {
        let mut repr = String::new();

        match format {
            NewickFormat::AllFields | NewickFormat::NoComments | NewickFormat::OnlyNames => {
                repr += &self.format_name()
            }
            NewickFormat::AllLengthsLeafNames => {
                if self.is_tip() {
                    repr += &self.format_name()
                }
            }
        }

        match format {
            NewickFormat::AllFields
            | NewickFormat::NoComments
            | NewickFormat::AllLengthsLeafNames => repr += &self.format_length(),
            NewickFormat::OnlyNames => (),
        }

        if let NewickFormat::AllFields = format {
            repr += &self.format_comment()
        }

        repr
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let parent_edges_equal = match (self.parent_edge, other.parent_edge) {
            (None, None) => true,
            (Some(l1), Some(l2)) => (l1 - l2).abs() < f64::EPSILON,
            _ => false,
        };

        self.id == other.id
            && self.name == other.name
            && self.parent == other.parent
            && self.children == other.children
            && self.comment == other.comment
            && parent_edges_equal
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.as_deref().unwrap_or("");
        match self.parent_edge {
            Some(l) => write!(f, "[{}] {name} ({l:.3})", self.id),
            None => write!(f, "[{}] {name}", self.id),
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:?}) {:?} Id[{}] Parent[{:?}] Comments[{:?}] Children({:?})",
            self.parent_edge, self.name, self.id, self.parent, self.comment, self.children,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_and_replace_children() {
        let mut node = Node::new();
        for child in [3, 5, 8] {
            node.add_child(child);
        }

        assert_eq!(node.remove_child(&5), Some(1));
        assert_eq!(node.remove_child(&5), None);
        assert_eq!(node.children, vec![3, 8]);

        assert!(node.replace_child(&3, 10));
        assert!(!node.replace_child(&42, 11));
        assert_eq!(node.children, vec![10, 8]);
    }

    #[test]
    fn newick_lengths_only_on_leaves_names() {
        let mut internal = Node::new_named("I");
        internal.set_parent(0, Some(2.0));
        internal.add_child(4);

        assert_eq!(internal.to_newick(NewickFormat::AllLengthsLeafNames), ":2");
        assert_eq!(internal.to_newick(NewickFormat::OnlyNames), "I");
    }

    #[test]
    fn deleted_node_is_reset() {
        let mut node = Node::new_named("A");
        node.set_parent(2, Some(0.1));
        node.delete();

        assert!(node.deleted);
        assert!(node.name.is_none());
        assert!(node.is_root());
    }
}

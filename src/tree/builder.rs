use std::collections::HashSet;

use log::debug;

use super::node::Node;
use super::tree_impl::{TopologyDefect, Tree, TreeError};
use super::{EdgeLength, NodeId};

/// An arena of [`Node`] objects used to assemble or edit a tree.
///
/// Nodes can be added, moved and deleted freely; ids are arena slots and
/// carry no meaning. Calling [`TreeBuilder::build`] checks that the nodes
/// form a single rooted tree with uniquely labelled tips and renumbers them
/// into a canonical [`Tree`].
///
/// ```
/// use phylokit::tree::{Node, TreeBuilder};
///
/// let mut builder = TreeBuilder::new();
/// let root = builder.add(Node::new());
/// let inner = builder.add_child(Node::new(), root, Some(0.5)).unwrap();
/// builder.add_child(Node::new_named("A"), inner, Some(0.1)).unwrap();
/// builder.add_child(Node::new_named("B"), inner, Some(0.2)).unwrap();
/// builder.add_child(Node::new_named("C"), root, Some(0.3)).unwrap();
///
/// let tree = builder.build().unwrap();
/// assert_eq!(tree.to_newick().unwrap(), "((A:0.1,B:0.2):0.5,C:0.3);");
/// // Tips come first, the root is the first internal node
/// assert_eq!(tree.root(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a new detached node to the arena.
    pub fn add(&mut self, node: Node) -> NodeId {
        let idx = self.nodes.len();
        let mut node = node;
        node.id = idx;
        node.deleted = false;
        self.nodes.push(node);

        idx
    }

    /// Add a node as the last child of `parent`.
    pub fn add_child(
        &mut self,
        node: Node,
        parent: NodeId,
        edge: Option<EdgeLength>,
    ) -> Result<NodeId, TreeError> {
        self.get(&parent)?;

        let mut node = node;
        node.set_parent(parent, edge);

        let id = self.add(node);
        self.get_mut(&parent)?.add_child(id);

        Ok(id)
    }

    /// Get a reference to a specific Node of the arena
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        match self.nodes.get(*id) {
            Some(node) if !node.deleted => Ok(node),
            _ => Err(TreeError::UnknownNode(*id)),
        }
    }

    /// Get a mutable reference to a specific Node of the arena
    pub fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, TreeError> {
        match self.nodes.get_mut(*id) {
            Some(node) if !node.deleted => Ok(node),
            _ => Err(TreeError::UnknownNode(*id)),
        }
    }

    /// Number of live nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| !node.deleted).count()
    }

    /// Checks if the arena holds no live node
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the subtree of `tree` rooted at `root` into the arena and
    /// returns the arena id of the copied root. The copy is detached and
    /// keeps the edge length `root` had to its parent.
    pub fn graft(&mut self, tree: &Tree, root: NodeId) -> Result<NodeId, TreeError> {
        let source = tree.get(&root)?;
        let copy = self.add(Node {
            parent: None,
            children: vec![],
            ..source.clone()
        });

        let mut stack = vec![(root, copy)];
        while let Some((original, copied)) = stack.pop() {
            for child in tree.get(&original)?.children.iter() {
                let child_node = tree.get(child)?;
                let child_copy = self.add_child(
                    Node {
                        parent: None,
                        children: vec![],
                        ..child_node.clone()
                    },
                    copied,
                    child_node.parent_edge,
                )?;
                stack.push((*child, child_copy));
            }
        }

        Ok(copy)
    }

    /// Deletes the subtree rooted at a given node, detaching it from its parent.
    pub fn delete_subtree(&mut self, root: &NodeId) -> Result<(), TreeError> {
        if let Some(parent) = self.get(root)?.parent {
            self.get_mut(&parent)?.remove_child(root);
        }

        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            stack.extend(self.get(&id)?.children.iter().copied());
            self.get_mut(&id)?.delete();
        }

        Ok(())
    }

    /// Removes a node that has exactly one child, the child takes its place.
    ///
    /// If the node has a parent, the two edges are fused and the child is put
    /// at the same position in the parent's children. If the node is a root,
    /// the child becomes the new root and inherits the root edge.
    pub fn splice_out(&mut self, id: &NodeId) -> Result<NodeId, TreeError> {
        let node = self.get(id)?;
        let &[child] = node.children.as_slice() else {
            return Err(TreeError::MalformedTopology {
                position: *id,
                defect: TopologyDefect::NotUnary(*id),
            });
        };

        let parent = node.parent;
        let parent_edge = node.parent_edge;

        match parent {
            Some(parent) => {
                let child_edge = self.get(&child)?.parent_edge;
                let fused = match (parent_edge, child_edge) {
                    (Some(p), Some(c)) => Some(p + c),
                    (p, c) => p.or(c),
                };
                self.get_mut(&parent)?.replace_child(id, child);
                self.get_mut(&child)?.set_parent(parent, fused);
            }
            None => {
                let child_node = self.get_mut(&child)?;
                child_node.parent = None;
                child_node.parent_edge = parent_edge;
            }
        }

        self.get_mut(id)?.delete();

        Ok(child)
    }

    /// Deletes a tip and every ancestor left without children, then splices
    /// out the first ancestor left with a single child.
    pub fn remove_tip(&mut self, tip: &NodeId) -> Result<(), TreeError> {
        let mut current = *tip;
        loop {
            let parent = self.get(&current)?.parent;
            self.delete_subtree(&current)?;

            let Some(parent) = parent else {
                return Ok(());
            };

            match self.get(&parent)?.children.len() {
                0 => current = parent,
                1 => {
                    self.splice_out(&parent)?;
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    fn find_root(&self) -> Result<NodeId, TreeError> {
        let roots: Vec<_> = self
            .nodes
            .iter()
            .filter(|node| !node.deleted && node.is_root())
            .map(|node| node.id)
            .collect();

        match roots.as_slice() {
            [] if self.is_empty() => Err(TreeError::MalformedTopology {
                position: 0,
                defect: TopologyDefect::Empty,
            }),
            [] => Err(TreeError::MalformedTopology {
                position: 0,
                defect: TopologyDefect::NoRoot,
            }),
            [root] => Ok(*root),
            [_, second, ..] => Err(TreeError::MalformedTopology {
                position: *second,
                defect: TopologyDefect::MultipleRoots(roots.clone()),
            }),
        }
    }

    /// Checks that the arena describes a single rooted tree with uniquely
    /// named tips, and renumbers it into a canonical [`Tree`].
    pub fn build(self) -> Result<Tree, TreeError> {
        let root = self.find_root()?;

        // Preorder walk, children in display order, with the parent that
        // reached each node
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, None)];
        while let Some((id, parent)) = stack.pop() {
            let node = self.get(&id)?;
            if seen[id] {
                return Err(TreeError::MalformedTopology {
                    position: id,
                    defect: TopologyDefect::MultipleParents(id),
                });
            }
            if let Some(parent) = parent {
                if node.parent != Some(parent) {
                    return Err(TreeError::MalformedTopology {
                        position: id,
                        defect: TopologyDefect::ParentMismatch { node: id, parent },
                    });
                }
            }
            seen[id] = true;
            order.push((id, parent));
            stack.extend(node.children.iter().rev().map(|child| (*child, Some(id))));
        }

        if let Some(orphan) = self
            .nodes
            .iter()
            .find(|node| !node.deleted && !seen[node.id])
        {
            return Err(TreeError::MalformedTopology {
                position: orphan.id,
                defect: TopologyDefect::Disconnected(orphan.id),
            });
        }

        let (tips, internals): (Vec<NodeId>, Vec<NodeId>) = order
            .iter()
            .map(|(id, _)| *id)
            .partition(|id| self.nodes[*id].is_tip());

        if internals.is_empty() {
            return Err(TreeError::MalformedTopology {
                position: root,
                defect: TopologyDefect::NoInternalNode,
            });
        }

        let mut labels = HashSet::with_capacity(tips.len());
        for tip in tips.iter() {
            match &self.nodes[*tip].name {
                None => {
                    return Err(TreeError::MalformedTopology {
                        position: *tip,
                        defect: TopologyDefect::UnnamedTip,
                    })
                }
                Some(name) if !labels.insert(name.as_str()) => {
                    return Err(TreeError::MalformedTopology {
                        position: *tip,
                        defect: TopologyDefect::DuplicateTipLabel(name.clone()),
                    })
                }
                _ => (),
            }
        }

        // Tips 1..=T, internal nodes T+1.. in preorder
        let mut new_ids = vec![0; self.nodes.len()];
        for (i, id) in tips.iter().chain(internals.iter()).enumerate() {
            new_ids[*id] = i + 1;
        }

        let mut nodes = vec![Node::new(); order.len()];
        for &(old, parent) in order.iter() {
            let source = &self.nodes[old];
            let slot = new_ids[old] - 1;
            nodes[slot] = Node {
                id: new_ids[old],
                parent: parent.map(|p| new_ids[p]),
                children: source.children.iter().map(|c| new_ids[*c]).collect(),
                ..source.clone()
            };
        }

        debug!(
            "Built tree with {} tips and {} internal nodes",
            tips.len(),
            internals.len()
        );

        Ok(Tree::from_canonical(nodes, tips.len()))
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&Tree> for TreeBuilder {
    /// Loads a tree in the arena so that arena ids match the tree's node ids.
    fn from(tree: &Tree) -> Self {
        // Slot 0 stays deleted: tree ids start at 1
        let mut placeholder = Node::new();
        placeholder.delete();

        let mut nodes = Vec::with_capacity(tree.size() + 1);
        nodes.push(placeholder);
        nodes.extend(tree.nodes().iter().cloned());

        Self { nodes }
    }
}

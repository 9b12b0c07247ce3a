//! Ordered collections of trees
//!
//! A [`TreeCollection`] holds several independent [`Tree`] objects, indexed
//! from 0 and optionally named. Collections are read from text holding
//! several newick trees one after the other.

use std::{fs, path::Path};

use itertools::Itertools;
use log::debug;

use crate::tree::{Tree, TreeError};

/// An ordered, optionally named, list of trees.
///
/// ```
/// use phylokit::collection::TreeCollection;
///
/// let trees = TreeCollection::from_newick("((A,B),C);\n(D,(E,F));").unwrap();
///
/// assert_eq!(trees.len(), 2);
/// assert_eq!(trees.get(1).unwrap().tip_labels(), vec!["D", "E", "F"]);
/// assert!(trees.get(2).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeCollection {
    trees: Vec<Tree>,
    names: Vec<Option<String>>,
}

impl TreeCollection {
    /// Creates an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unnamed tree
    pub fn push(&mut self, tree: Tree) {
        self.trees.push(tree);
        self.names.push(None);
    }

    /// Appends a named tree
    pub fn push_named(&mut self, name: &str, tree: Tree) {
        self.trees.push(tree);
        self.names.push(Some(name.to_string()));
    }

    /// Number of trees in the collection
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Checks if the collection holds no tree
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Gets the tree at a given index
    pub fn get(&self, index: usize) -> Option<&Tree> {
        self.trees.get(index)
    }

    /// Gets the first tree with a given name
    pub fn get_by_name(&self, name: &str) -> Option<&Tree> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|index| &self.trees[index])
    }

    /// Names of the trees, in order
    pub fn names(&self) -> Vec<Option<&str>> {
        self.names.iter().map(Option::as_deref).collect()
    }

    /// Iterates over the trees
    pub fn iter(&self) -> std::slice::Iter<'_, Tree> {
        self.trees.iter()
    }

    /// Applies a fallible operation to every tree, keeping the names.
    /// Fails on the first tree for which the operation fails.
    /// ```
    /// use phylokit::collection::TreeCollection;
    ///
    /// let trees = TreeCollection::from_newick("((A,B),C);((A,C),(B,D));").unwrap();
    /// let pruned = trees.try_map(|tree| tree.prune(&["A"])).unwrap();
    ///
    /// assert_eq!(pruned.to_newick().unwrap(), "(B,C);\n(C,(B,D));\n");
    /// ```
    pub fn try_map<F>(&self, mut f: F) -> Result<Self, TreeError>
    where
        F: FnMut(&Tree) -> Result<Tree, TreeError>,
    {
        let trees = self
            .trees
            .iter()
            .enumerate()
            .map(|(index, tree)| f(tree).map_err(|e| in_collection(index, e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            names: self.names.clone(),
        })
    }

    /// Reads trees from a string holding one or more newick trees, each
    /// terminated by a semicolon. Semicolons within quotes or comments do not
    /// end a tree.
    pub fn from_newick(text: &str) -> Result<Self, TreeError> {
        let mut collection = Self::new();

        for (index, newick) in split_trees(text).into_iter().enumerate() {
            let tree = Tree::from_newick(newick).map_err(|e| in_collection(index, e))?;
            collection.push(tree);
        }

        debug!("Read a collection of {} trees", collection.len());

        Ok(collection)
    }

    /// Reads a collection from a file of newick trees
    pub fn from_file(path: &Path) -> Result<Self, TreeError> {
        let text = fs::read_to_string(path)?;
        Self::from_newick(&text)
    }

    /// Writes the collection as newick strings, one tree per line
    pub fn to_newick(&self) -> Result<String, TreeError> {
        let mut output = String::new();
        for (index, tree) in self.trees.iter().enumerate() {
            output += &tree.to_newick().map_err(|e| in_collection(index, e))?;
            output.push('\n');
        }

        Ok(output)
    }

    /// Writes the collection to a newick file
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        fs::write(path, self.to_newick()?)?;
        Ok(())
    }

    /// Outputs a Nexus formatted string of the collection. Unnamed trees are
    /// called `tree1`, `tree2`... after their position.
    /// ```
    /// use phylokit::collection::TreeCollection;
    ///
    /// let trees = TreeCollection::from_newick("((A,B),C);((A,C),D);").unwrap();
    /// let nexus = trees.to_nexus().unwrap();
    ///
    /// assert!(nexus.contains("TAXLABELS A B C D;"));
    /// assert!(nexus.contains("TREE tree2 = ((A,C),D);"));
    /// ```
    pub fn to_nexus(&self) -> Result<String, TreeError> {
        let labels: Vec<&str> = self
            .trees
            .iter()
            .flat_map(|tree| tree.tip_labels())
            .unique()
            .collect();
        let n = labels.len();
        let labels = labels.join(" ");

        let mut trees = String::new();
        for (index, (tree, name)) in self.trees.iter().zip(self.names.iter()).enumerate() {
            let nwk = tree.to_newick().map_err(|e| in_collection(index, e))?;
            let name = name.clone().unwrap_or_else(|| format!("tree{}", index + 1));
            trees += &format!("    TREE {name} = {nwk}\n");
        }

        Ok(format!(
            "#NEXUS
BEGIN TAXA;
    DIMENSIONS NTAX={n};
    TAXLABELS {labels};
END;
BEGIN TREES;
{trees}END;
"
        ))
    }
}

fn in_collection(index: usize, source: TreeError) -> TreeError {
    TreeError::InCollection {
        index,
        source: Box::new(source),
    }
}

// Splits the text after each semicolon that is outside of quotes and comments.
// Whitespace only leftovers are dropped.
fn split_trees(text: &str) -> Vec<&str> {
    let mut trees = vec![];
    let mut start = 0;
    let mut within_quotes = false;
    let mut within_comment = false;

    for (position, c) in text.char_indices() {
        match c {
            '"' if !within_comment => within_quotes = !within_quotes,
            '[' if !within_quotes => within_comment = true,
            ']' if !within_quotes => within_comment = false,
            ';' if !within_quotes && !within_comment => {
                trees.push(&text[start..=position]);
                start = position + 1;
            }
            _ => (),
        }
    }

    let rest = &text[start..];
    if !rest.trim().is_empty() {
        trees.push(rest);
    }

    trees
}

impl FromIterator<Tree> for TreeCollection {
    fn from_iter<I: IntoIterator<Item = Tree>>(iter: I) -> Self {
        let mut collection = Self::new();
        for tree in iter {
            collection.push(tree);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a TreeCollection {
    type Item = &'a Tree;
    type IntoIter = std::slice::Iter<'a, Tree>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

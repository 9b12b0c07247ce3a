use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use phylokit::{distr::Distr, tree::NodeId, TreeShape};

/// A simple command line tool to build, query and edit phylogenetic trees.
///
/// Input files may hold several newick trees, commands are applied to each of them.
#[derive(Parser, Debug)]
pub struct Args {
    #[command(subcommand)]
    /// The command to execute
    pub command: Commands,
}

/// The available commands in the `phylokit` tool
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate random tree(s)
    Generate {
        /// Number of tips in the generated tree
        #[arg(short, long, default_value_t = 20)]
        tips: usize,

        /// Shape of the generated tree
        #[arg(value_enum, short, long, default_value_t=TreeShape::Yule)]
        shape: TreeShape,

        /// Distribution of branch lengths, no branch lengths if missing
        #[arg(value_enum, short, long)]
        distribution: Option<Distr>,

        /// Number of trees to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        trees: usize,

        /// Seed of the random generator
        #[arg(long)]
        seed: Option<u64>,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Get statistics about trees
    Stats {
        /// Input newick files
        trees: Vec<PathBuf>,
    },

    /// Print trees to the terminal
    Show {
        /// Input newick file
        tree: PathBuf,
        /// Show all node fields
        #[arg(short, long)]
        debug: bool,
    },

    /// Output the edge tables of trees as JSON
    Table {
        /// Input newick file
        tree: PathBuf,
        /// File to save the tables to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Describe the clade spanned by a set of tips
    ///
    /// This will return:
    ///  - the id of the most recent common ancestor of the tips
    ///  - all the tips descending from that ancestor
    ///  - the indices of the edges joining the tips to their ancestor
    #[clap(verbatim_doc_comment)]
    Clade {
        /// Input newick file
        tree: PathBuf,
        /// Labels of the tips
        #[arg(required = true)]
        tips: Vec<String>,
    },

    /// Remove tips from the trees
    Prune {
        /// Input newick file
        tree: PathBuf,
        /// Labels of tips to remove
        tips: Vec<String>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Keep only some tips of the trees
    Keep {
        /// Input newick file
        tree: PathBuf,
        /// Labels of tips to keep
        tips: Vec<String>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract the clade rooted at the common ancestor of some tips
    Extract {
        /// Input newick file
        tree: PathBuf,
        /// Labels of tips defining the clade
        #[arg(required = true)]
        tips: Vec<String>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Swap the two children of a node
    Rotate {
        /// Input newick file
        tree: PathBuf,
        /// Id of the node to rotate
        node: NodeId,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve multifurcations to binarize the trees
    Resolve {
        /// Input newick file
        tree: PathBuf,
        /// Pair children at random instead of in order
        #[arg(short, long)]
        random: bool,
        /// Seed of the random generator
        #[arg(long, requires = "random")]
        seed: Option<u64>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Graft a tree onto each tree of a file
    Bind {
        /// Input newick file
        host: PathBuf,
        /// Newick file of the tree to graft
        graft: PathBuf,
        /// Attach the graft at the tip with this label
        #[arg(short, long, conflicts_with = "node")]
        tip: Option<String>,
        /// Attach the graft at the node with this id (defaults to the root)
        #[arg(short, long)]
        node: Option<NodeId>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sort the children of each node by number of descendants
    Ladderize {
        /// Input newick file
        tree: PathBuf,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

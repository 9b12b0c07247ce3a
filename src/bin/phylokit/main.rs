#![warn(missing_docs)]
//! The `phylokit` binary is a command line tool, using the `[phylokit]` crate.
//! It is made to execute common operations on phylogenetic trees directly in the terminal.

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use env_logger::Env;
use indicatif::ProgressIterator;
use itertools::Itertools;
use log::info;
use phylokit::{
    collection::TreeCollection,
    generate_tree,
    tree::{Resolution, Tree, TreeError},
};
use rand::{rngs::StdRng, SeedableRng};
use std::{error::Error, fmt::Display, fs, io, path::Path, path::PathBuf};

/// contains the struct representing the command line arguments
/// parsed by [`clap`] and used to execute this binary
pub mod cli;

type CliResult = Result<(), Box<dyn Error>>;

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn write_trees(trees: &TreeCollection, output: Option<PathBuf>) -> CliResult {
    match output {
        Some(path) => trees.to_file(&path)?,
        None => print!("{}", trees.to_newick()?),
    }
    Ok(())
}

fn edit_trees<F>(input: &Path, output: Option<PathBuf>, f: F) -> CliResult
where
    F: FnMut(&Tree) -> Result<Tree, TreeError>,
{
    let trees = TreeCollection::from_file(input)?;
    write_trees(&trees.try_map(f)?, output)
}

fn to_repr<T, E>(res: Result<T, E>) -> String
where
    T: Display,
{
    res.map_or_else(|_| "-".into(), |v| format!("{v}"))
}

fn print_stats(path: &Path) -> CliResult {
    let trees = TreeCollection::from_file(path)?;
    for (i, tree) in trees.iter().enumerate() {
        println!(
            "{}\t{i}\t{}\t{}\t{}\t{}\t{}\t{}",
            path.display(),
            tree.n_tips(),
            tree.n_internal(),
            tree.n_edges(),
            tree.is_binary(),
            tree.height(),
            to_repr(tree.length()),
        )
    }
    Ok(())
}

fn main() -> CliResult {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    match cli::Args::parse().command {
        cli::Commands::Generate {
            tips,
            shape,
            distribution,
            trees,
            seed,
            output,
        } => {
            let mut rng = seeded_rng(seed);
            let random = (0..trees)
                .progress_count(trees as u64)
                .map(|_| generate_tree(tips, shape, distribution, &mut rng))
                .collect::<Result<TreeCollection, _>>()?;
            info!("Generated {} trees with {tips} tips", random.len());
            write_trees(&random, output)?;
        }
        cli::Commands::Stats { trees } => {
            println!("file\ttree\ttips\tinternal\tedges\tbinary\theight\tlength");
            for path in trees {
                print_stats(&path)?;
            }
        }
        cli::Commands::Show { tree, debug } => {
            for tree in TreeCollection::from_file(&tree)?.iter() {
                if debug {
                    tree.print_debug()?;
                } else {
                    tree.print()?;
                }
            }
        }
        cli::Commands::Table { tree, output } => {
            let tables = TreeCollection::from_file(&tree)?
                .iter()
                .map(Tree::edge_table)
                .collect_vec();
            let json = serde_json::to_string_pretty(&tables)?;
            match output {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        cli::Commands::Clade { tree, tips } => {
            println!("tree\tmrca\ttips\tedges");
            for (i, tree) in TreeCollection::from_file(&tree)?.iter().enumerate() {
                let mrca = tree.mrca(&tips)?;
                println!(
                    "{i}\t{mrca}\t{}\t{}",
                    tree.descendant_tips(&mrca)?.iter().join(","),
                    tree.edges_within_clade(&tips)?.iter().join(","),
                );
            }
        }
        cli::Commands::Prune { tree, tips, output } => {
            edit_trees(&tree, output, |t| t.prune(&tips))?;
        }
        cli::Commands::Keep { tree, tips, output } => {
            edit_trees(&tree, output, |t| t.keep_tips(&tips))?;
        }
        cli::Commands::Extract { tree, tips, output } => {
            edit_trees(&tree, output, |t| t.extract_clade(&t.mrca(&tips)?))?;
        }
        cli::Commands::Rotate { tree, node, output } => {
            edit_trees(&tree, output, |t| t.rotate(&node))?;
        }
        cli::Commands::Resolve {
            tree,
            random,
            seed,
            output,
        } => {
            let mut rng = seeded_rng(seed);
            edit_trees(&tree, output, |t| {
                if random {
                    t.resolve_polytomies(Resolution::Random(&mut rng))
                } else {
                    t.resolve_polytomies(Resolution::Ordered)
                }
            })?;
        }
        cli::Commands::Bind {
            host,
            graft,
            tip,
            node,
            output,
        } => {
            let graft = Tree::from_file(&graft)?;
            edit_trees(&host, output, |t| {
                let attachment = match (&tip, node) {
                    (Some(label), _) => t
                        .tip_id(label)
                        .ok_or_else(|| TreeError::DisjointTipSet(Some(label.clone())))?,
                    (None, Some(node)) => node,
                    (None, None) => t.root(),
                };
                t.bind(&graft, &attachment)
            })?;
        }
        cli::Commands::Ladderize { tree, output } => {
            edit_trees(&tree, output, Tree::ladderize)?;
        }
        cli::Commands::Completion { shell } => {
            let mut cmd = cli::Args::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}

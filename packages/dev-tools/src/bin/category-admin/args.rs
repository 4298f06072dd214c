use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "category-admin")]
#[command(about = "Inspect and maintain a tenant's category tree")]
#[command(version)]
pub struct Cli {
    /// JSON config file (default: defaults overlaid with CATEGORY_TREE_* variables)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Tenant to operate on
    #[arg(short, long, global = true, default_value = "default")]
    pub tenant: String,

    /// Acting user (the CLI grants itself every permission)
    #[arg(short, long, global = true, default_value = "operator")]
    pub user: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the tree with levels and counts
    Tree,

    /// Add a category
    Add {
        title: String,

        /// URL slug (default: derived from the title)
        #[arg(short, long, default_value = "")]
        slug: String,

        /// Parent category id (default: top level)
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Change title and slug of a category
    Rename {
        id: String,
        title: String,

        #[arg(short, long, default_value = "")]
        slug: String,
    },

    /// Move a subtree
    Move {
        id: String,

        /// New parent id (default: top level)
        #[arg(short, long)]
        parent: Option<String>,

        /// Sibling position (default: last)
        #[arg(long)]
        position: Option<usize>,
    },

    /// Apply a drag-and-drop order from a JSON file of {id, left, right} entries
    Reorder {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete a category
    Delete {
        id: String,

        /// Category that receives the content (default: uncategorized)
        #[arg(long)]
        target: Option<String>,

        /// Keep the children, moving them up one level
        #[arg(long)]
        keep_children: bool,
    },

    /// Move every content item of one category to another
    MoveContent {
        from: String,

        /// Target category (default: uncategorized)
        #[arg(long)]
        to: Option<String>,
    },

    /// File a content item under a category
    Assign {
        item: String,

        #[arg(long, default_value = "Untitled")]
        title: String,

        /// Category id (default: uncategorized)
        #[arg(long)]
        category: Option<String>,
    },

    /// Flatten the tree to top level
    Reset,

    /// Recompute every direct and total count
    Recount,

    /// Check the stored tree for broken invariants
    Check,
}

//! Category Admin CLI
//!
//! Operator tool for a local category database: the same actions the admin
//! screens offer, plus the recovery commands (reset, recount, check).
//!
//! # Usage
//!
//! ```bash
//! category-admin --db ./data/categories.db --tenant blog tree
//! category-admin --tenant blog add "Rust News" --parent <id>
//! category-admin --tenant blog reorder --file order.json
//! category-admin --tenant blog delete <id> --target <other-id>
//! ```
//!
//! # Environment Variables
//!
//! - `CATEGORY_TREE_DB`, `CATEGORY_TREE_BUSY_TIMEOUT_MS`,
//!   `CATEGORY_TREE_MAX_RETRIES`, `CATEGORY_TREE_RESET_ORDER`: see `TreeConfig`
//! - `RUST_LOG`: logging filter (default `category_admin=info,category_tree_core=info`)

use std::path::Path;

use anyhow::Context;
use category_tree_core::config::TreeConfig;
use category_tree_core::models::{CategoryId, TenantId, UserId};
use category_tree_core::operations::{ConflictRetry, RawOrderEntry};
use category_tree_core::services::{CategoryAdmin, CategoryTree, APPEND};
use clap::Parser;
use serde::Serialize;

mod args;
use args::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("category_admin=info,category_tree_core=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    tracing::debug!(db = %config.database_path.display(), "Opening category database");

    let retry = ConflictRetry::from_config(&config);
    let admin = CategoryAdmin::open(config)
        .await
        .context("Failed to open category database")?;
    let tenant = TenantId::new(cli.tenant);
    let user = UserId::new(cli.user);
    let (t, u) = (&tenant, &user);

    match cli.command {
        Commands::Tree => print_tree(&admin.tree(t).await?, cli.json)?,
        Commands::Add {
            title,
            slug,
            parent,
        } => {
            let parent = parent.map(CategoryId::new);
            let id = retry
                .run(|| admin.add(t, u, parent.as_ref(), &title, &slug))
                .await?;
            print(&id, cli.json)?;
        }
        Commands::Rename { id, title, slug } => {
            let id = CategoryId::new(id);
            retry.run(|| admin.rename(t, u, &id, &title, &slug)).await?;
            print(&"renamed", cli.json)?;
        }
        Commands::Move {
            id,
            parent,
            position,
        } => {
            let id = CategoryId::new(id);
            let parent = parent.map(CategoryId::new);
            let position = position.unwrap_or(APPEND);
            retry
                .run(|| {
                    admin
                        .maintainer()
                        .move_subtree(t, u, &id, parent.as_ref(), position)
                })
                .await?;
            print(&"moved", cli.json)?;
        }
        Commands::Reorder { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<RawOrderEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of order entries", file.display()))?;
            let plan = retry.run(|| admin.submit_order(t, u, &entries)).await?;
            print(&plan, cli.json)?;
        }
        Commands::Delete {
            id,
            target,
            keep_children,
        } => {
            let id = CategoryId::new(id);
            let target = target.map(CategoryId::new);
            let summary = retry
                .run(|| admin.delete(t, u, &id, target.as_ref(), keep_children))
                .await?;
            print(&summary, cli.json)?;
        }
        Commands::MoveContent { from, to } => {
            let from = CategoryId::new(from);
            let to = to.map(CategoryId::new);
            let report = retry
                .run(|| admin.move_content(t, u, &from, to.as_ref()))
                .await?;
            print(&report, cli.json)?;
        }
        Commands::Assign {
            item,
            title,
            category,
        } => {
            let category = category.map(CategoryId::new);
            let previous = retry
                .run(|| admin.assign_item(t, u, &item, &title, category.as_ref()))
                .await?;
            print(&previous, cli.json)?;
        }
        Commands::Reset => {
            let flattened = retry.run(|| admin.reset(t, u)).await?;
            print(&flattened, cli.json)?;
        }
        Commands::Recount => {
            let counted = retry.run(|| admin.recount(t, u)).await?;
            print(&counted, cli.json)?;
        }
        Commands::Check => {
            let report = admin.check(t).await?;
            if cli.json {
                print(&report, true)?;
            } else if report.is_consistent() {
                println!("{} categories, no violations", report.categories);
            } else {
                for violation in &report.violations {
                    println!("{}", violation);
                }
            }
            if !report.is_consistent() {
                anyhow::bail!("{} integrity violations", report.violations.len());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TreeConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(TreeConfig::from_env()),
    }
}

fn print<T: Serialize + std::fmt::Debug>(value: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:?}", value);
    }
    Ok(())
}

fn print_tree(tree: &CategoryTree, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tree.categories())?);
        return Ok(());
    }

    if tree.is_empty() {
        println!("(no categories)");
    }
    for entry in tree {
        let c = entry.category;
        println!(
            "{}{} [{}] ({}, {}) direct={} total={}  {}",
            "  ".repeat(entry.level.max(0) as usize),
            c.title,
            c.slug,
            c.lft,
            c.rgt,
            c.direct_count,
            c.total_count,
            c.id
        );
    }
    Ok(())
}

//! Rename a production out of the way.
//!
//! Nothing is ever destroyed: the catalog row, the local directory and the
//! storage-side directory are renamed with an incrementing `_deleted_NN`
//! suffix so a mistaken deletion stays recoverable.

use super::Context;
use crate::precondition_bail;
use anyhow::Result;
use gridflow_db::Catalog;
use gridflow_grid::{GfalStorage, Storage};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(clap::Args, Debug)]
pub struct DeleteProductionArgs {
    /// Production to delete (repeatable)
    #[arg(short = 'p', long = "production")]
    pub productions: Vec<String>,

    /// File with productions to delete, one per line (repeatable)
    #[arg(short = 'L', long = "list")]
    pub lists: Vec<PathBuf>,

    /// Fake mode: show what would be done
    #[arg(short = 'f', long)]
    pub fake: bool,
}

fn collect_productions(args: &DeleteProductionArgs) -> Result<Vec<String>> {
    let mut names = BTreeSet::new();
    for name in &args.productions {
        names.insert(name.trim().to_string());
    }
    for list in &args.lists {
        if !list.is_file() {
            precondition_bail!(
                "production list file '{}' not found or not readable",
                list.display()
            );
        }
        for line in std::fs::read_to_string(list)?.lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                names.insert(trimmed.to_string());
            }
        }
    }
    Ok(names.into_iter().collect())
}

/// First free `<name>_deleted_NN` spot in the catalog.
async fn free_catalog_name(catalog: &Catalog, name: &str) -> Result<Option<String>> {
    for index in 0..100u32 {
        let candidate = format!("{name}_deleted_{index:02}");
        if !catalog.production_exists(&candidate).await? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// First free `<path>_deleted_NN` spot on the local filesystem.
fn free_local_path(path: &Path) -> Option<PathBuf> {
    let base = path.to_string_lossy().into_owned();
    (0..100u32)
        .map(|index| PathBuf::from(format!("{base}_deleted_{index:02}")))
        .find(|candidate| !candidate.exists())
}

async fn delete_one(catalog: &Catalog, name: &str, fake: bool) -> Result<()> {
    let Some(prod_id) = catalog.get_prod_id(name).await? else {
        println!("WARNING production '{name}' not found in catalog, skipping");
        return Ok(());
    };
    let info = catalog.get_prod_info(prod_id).await?;

    let Some(new_name) = free_catalog_name(catalog, name).await? else {
        precondition_bail!("production '{name}': all _deleted_ slots are taken");
    };

    // Catalog row
    if fake {
        println!("FAKE rename catalog production '{name}' -> '{new_name}'");
    } else {
        catalog.rename_production(prod_id, &new_name).await?;
        println!("- Catalog production '{name}' renamed to '{new_name}'");
        let artifacts = catalog.get_prod_file_list(&new_name).await?;
        println!(
            "- {} artifact(s) follow the storage directory rename",
            artifacts.len()
        );
    }

    // Local production directory
    let prod_dir = PathBuf::from(&info.prod_dir);
    if prod_dir.is_dir() {
        match free_local_path(&prod_dir) {
            Some(target) => {
                if fake {
                    println!(
                        "FAKE rename directory {} -> {}",
                        prod_dir.display(),
                        target.display()
                    );
                } else {
                    std::fs::rename(&prod_dir, &target)?;
                    println!("- Directory {} renamed to {}", prod_dir.display(), target.display());
                }
            }
            None => println!(
                "WARNING no free _deleted_ slot for directory {}",
                prod_dir.display()
            ),
        }
    }

    // Storage-side directory
    let storage = GfalStorage::new();
    let src = format!("{}{}", info.storage_uri, info.storage_dir);
    let mut renamed = false;
    for index in 0..100u32 {
        let dst = format!("{src}_deleted_{index:02}");
        if fake {
            println!("FAKE rename storage {src} -> {dst}");
            renamed = true;
            break;
        }
        if storage.exists(&dst).await? {
            continue;
        }
        if storage.rename(&src, &dst).await.is_ok() {
            println!("- Storage {src} renamed to {dst}");
            renamed = true;
            break;
        }
    }
    if !renamed && !fake {
        println!("WARNING unable to rename storage directory {src}");
    }
    Ok(())
}

pub async fn run(ctx: &Context, args: DeleteProductionArgs) -> Result<()> {
    let _ = gridflow_logging::init_logging(gridflow_logging::LogConfig::console(ctx.verbose));
    if args.fake {
        println!("FAKE mode enabled");
    }

    let names = collect_productions(&args)?;
    if names.is_empty() {
        precondition_bail!("no productions specified: use -p and/or -L");
    }

    let catalog = ctx.open_catalog().await?;
    for name in &names {
        println!("=== Deleting production {name} ===");
        delete_one(&catalog, name, args.fake).await?;
    }
    Ok(())
}

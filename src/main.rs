mod audit;
mod config;
mod db;
mod error;
mod parser;
mod remove;
mod report;
mod search;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::db::SqliteStore;

#[derive(Parser)]
#[command(name = "block-tools", about = "Audit, search and remove blocks in stored posts")]
struct Cli {
    /// SQLite database to operate on (overrides config and BLOCK_TOOLS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find every instance of a block and write them to a CSV report
    Search {
        /// Block name to search for, e.g. core/paragraph
        #[arg(long)]
        marker_name: Option<String>,
        /// Only search this tenant (default: all tenants)
        #[arg(long)]
        tenant_id: Option<i64>,
        /// Post type to search
        #[arg(long, default_value = search::DEFAULT_POST_TYPE)]
        post_type: String,
        /// Report file name, created in the configured upload directory
        #[arg(long, default_value = search::DEFAULT_FILE)]
        file: String,
    },
    /// Remove every instance of a block from published posts
    Remove {
        /// Block name to remove
        #[arg(long)]
        marker_name: Option<String>,
        /// Tenant to operate on (required on multi-tenant stores)
        #[arg(long)]
        tenant_id: Option<i64>,
        /// Comma-separated post types, e.g. post,page
        #[arg(long)]
        post_type: Option<String>,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List the distinct blocks used by a post type
    Audit {
        /// Post type to audit
        #[arg(long, default_value = search::DEFAULT_POST_TYPE)]
        post_type: String,
        /// Tenant to audit (default: main site)
        #[arg(long)]
        tenant_id: Option<i64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.db.as_deref())?;

    let result = match cli.command {
        Commands::Search {
            marker_name,
            tenant_id,
            post_type,
            file,
        } => {
            let req = search::SearchRequest {
                marker_name,
                tenant: tenant_id,
                post_type: Some(post_type),
                file: Some(file),
            };
            req.marker()?;
            let store = open_store(&settings)?;
            let (path, stats) = search::run(&store, &settings, &req)?;
            println!(
                "Success: {} blocks from {} posts extracted to {}",
                stats.rows,
                stats.documents,
                path.display()
            );
            Ok(())
        }
        Commands::Remove {
            marker_name,
            tenant_id,
            post_type,
            dry_run,
        } => {
            let req = remove::RemoveRequest {
                marker_name,
                tenant: tenant_id,
                post_types: post_type,
                dry_run,
            };
            req.validate()?;
            let store = open_store(&settings)?;
            let stats = remove::run(&store, &req)?;
            if !stats.skipped_post_types.is_empty() {
                eprintln!("Skipped post types: {}", stats.skipped_post_types.join(", "));
            }
            let verb = if dry_run { "Would remove" } else { "Removed" };
            println!(
                "Success: {} {} '{}' blocks from {} posts{}.",
                verb,
                stats.blocks,
                req.marker_name.as_deref().unwrap_or_default(),
                stats.documents,
                tenant_id
                    .map(|t| format!(" in tenant {}", t))
                    .unwrap_or_default()
            );
            Ok(())
        }
        Commands::Audit {
            post_type,
            tenant_id,
        } => {
            let store = open_store(&settings)?;
            let req = audit::AuditRequest {
                post_type: Some(post_type),
                tenant: tenant_id,
            };
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("Auditing posts [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
                    .progress_chars("#>-"),
            );
            let names = audit::run(&store, settings.page_size, &req, &pb)?;
            println!("List of used blocks:");
            for name in &names {
                println!("{}", name);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(settings)
        .with_context(|| format!("Failed to open database {:?}", settings.db_path))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

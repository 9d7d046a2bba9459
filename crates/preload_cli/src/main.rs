//! CLI entry point for inspecting preloaded catalog graphs.
//!
//! # Responsibility
//! - Open (or create) a catalog database and seed a demo graph when empty.
//! - Print items with their preloaded tags as pretty JSON.

use clap::Parser;
use log::info;
use preload_core::{
    init_logging, open_db_with, CatalogRepository, DbOptions, Item, LogConfig, Query,
    SqliteCatalogRepository, SubTag, Tag,
};
use rusqlite::Connection;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "preload_cli", version, about = "Print items with preloaded tags")]
struct Cli {
    /// Database file; an in-memory database is used when omitted.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Only preload related rows with this status.
    #[arg(long)]
    status: Option<String>,

    /// Also preload each tag's sub-tags.
    #[arg(long)]
    nested: bool,

    #[arg(long, default_value_t = preload_core::default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for rotating log files; stderr when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("preload_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut log_config = LogConfig::new(cli.log_level.as_str());
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    init_logging(&log_config)?;

    let options = match &cli.db {
        Some(path) => DbOptions::file(path),
        None => DbOptions::in_memory(),
    };
    let mut conn = open_db_with(&options)?;
    seed_demo_graph(&mut conn)?;

    let items = build_query(cli.status.as_deref(), cli.nested).find(&conn)?;
    info!(
        "event=cli_find module=cli status=ok items={} nested={}",
        items.len(),
        cli.nested
    );
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

fn build_query(status: Option<&str>, nested: bool) -> Query<Item> {
    let query = Query::<Item>::new();
    let query = match status {
        Some(status) => {
            let status = status.to_string();
            query.preload_with("Tags", |scope| scope.where_eq("tags.status", status))
        }
        None => query.preload("Tags"),
    };
    if !nested {
        return query;
    }
    match status {
        Some(status) => {
            let status = status.to_string();
            query.preload_with("Tags.SubTags", |scope| {
                scope.where_eq("sub_tags.status", status)
            })
        }
        None => query.preload("Tags.SubTags"),
    }
}

fn seed_demo_graph(conn: &mut Connection) -> Result<(), Box<dyn Error>> {
    if Query::<Item>::new().count(conn)? > 0 {
        return Ok(());
    }

    let mut repo = SqliteCatalogRepository::try_new(conn)?;
    let mut items = vec![
        Item::with_tags(
            "Item1",
            vec![
                Tag::with_sub_tags(
                    "Tag1",
                    "active",
                    vec![
                        SubTag::new("SubTag1", "active"),
                        SubTag::new("SubTag2", "inactive"),
                    ],
                ),
                Tag::new("Tag2", "inactive"),
            ],
        ),
        Item::with_tags("Item2", vec![Tag::new("Tag3", "inactive")]),
    ];
    for item in &mut items {
        repo.create_item(item)?;
    }
    info!("event=cli_seed module=cli status=ok items={}", items.len());
    Ok(())
}

//! Index Plan CLI
//!
//! Loads a declarative schema and shows which indexes each table would drop
//! and create, given a JSON snapshot of the indexes the store currently has.
//! Nothing is sent to a store.
//!
//! Usage:
//!   docmap-indexes plan --schema schema.toml --actual indexes.json
//!   docmap-indexes show --schema schema.toml
//!   docmap-indexes --help
//!
//! The snapshot maps table names to index names:
//!   { "post": ["id", "title_old"], "blog__post_comment": [] }

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use docmap_schemas::mock::MockExecutor;
use docmap_schemas::{Catalog, IndexReconciler, ReconcilePlan, SchemaConfig, SchemaDefinition};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docmap-indexes")]
#[command(about = "Plan secondary index changes for declared document types")]
struct Cli {
    /// Config file (defaults to docmap.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the drop/create plan for every type
    Plan {
        /// Schema file (defaults to [schema].path from config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// JSON snapshot of the store's current indexes
        #[arg(short, long)]
        actual: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Exit with status 1 when any change is planned
        #[arg(long)]
        strict: bool,
    },

    /// List declared types with their fields, indexes and relations
    Show {
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = SchemaConfig::load_from(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Plan {
            schema,
            actual,
            format,
            strict,
        } => {
            let catalog = load_catalog(schema, &config)?;
            let executor = load_snapshot(&actual)?;
            let reconciler = IndexReconciler::new(&executor, config.reconcile_options());

            let plans = catalog
                .types()
                .map(|t| reconciler.plan(t))
                .collect::<Result<Vec<_>, _>>()?;

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
                Format::Text => print_plans(&plans),
            }

            let changes = plans.iter().any(|p| !p.is_empty());
            Ok(if changes && strict { 1 } else { 0 })
        }
        Command::Show { schema } => {
            let catalog = load_catalog(schema, &config)?;
            print_catalog(&catalog);
            Ok(0)
        }
    }
}

fn load_catalog(schema: Option<PathBuf>, config: &SchemaConfig) -> anyhow::Result<Catalog> {
    let Some(path) = schema.or_else(|| config.schema_path()) else {
        bail!("no schema file given and [schema].path is not configured");
    };
    let definition = SchemaDefinition::load(&path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    Ok(definition.into_catalog()?)
}

fn load_snapshot(path: &Path) -> anyhow::Result<MockExecutor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let tables: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;

    Ok(tables
        .into_iter()
        .fold(MockExecutor::new(), |executor, (table, indexes)| {
            executor.with_indexes(&table, indexes)
        }))
}

fn print_plans(plans: &[ReconcilePlan]) {
    for plan in plans {
        if plan.is_empty() {
            println!("{} ({}): up to date", plan.doc_type, plan.table);
            continue;
        }
        println!("{} ({}):", plan.doc_type, plan.table);
        for name in &plan.to_drop {
            println!("  - drop   {}", name);
        }
        for name in &plan.to_create {
            println!("  + create {}", name);
        }
    }

    let drops: usize = plans.iter().map(|p| p.to_drop.len()).sum();
    let creates: usize = plans.iter().map(|p| p.to_create.len()).sum();
    println!("\n{} to drop, {} to create", drops, creates);
}

fn print_catalog(catalog: &Catalog) {
    for doc_type in catalog.types() {
        match doc_type.parent() {
            Some(parent) => println!("{} < {} [{}]", doc_type.name(), parent, doc_type.table_name()),
            None => println!("{} [{}]", doc_type.name(), doc_type.table_name()),
        }
        for name in doc_type.fields().names() {
            let type_name = doc_type
                .field(name)
                .and_then(|f| f.type_tag())
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  field    {}: {}", name, type_name);
        }
        for spec in doc_type.indexes().iter() {
            let multi = if spec.options.multi { " multi" } else { "" };
            println!("  index    {} ({}{})", spec.name, spec.kind.label(), multi);
        }
        for relation in doc_type.associations().iter() {
            println!(
                "  relation {} -> {} ({:?})",
                relation.name(),
                relation.target_type_name(),
                relation.kind()
            );
        }
    }
}

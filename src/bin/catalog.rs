//! Data Catalog CLI
//!
//! Browse catalog assets and check transformation link changes for breaking
//! lineage.
//!
//! Usage:
//!   catalog data-stores
//!   catalog fields "Warehouse" public.orders
//!   catalog breaking-change 12 --links links.json --show-by schema --dot impact.dot

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use datacatalog_client::catalog::DataSchema;
use datacatalog_client::{
    Catalog, CatalogConfig, CatalogEntity, DataStore, EntityInput, LinkInput, ShowBy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Browse a data catalog and check lineage impact of link changes")]
struct Cli {
    /// Configuration file (layered over catalog.toml and DATACATALOG__* variables)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List users
    Users,
    /// List data stores
    DataStores,
    /// List the schemas of a data store
    Schemas {
        /// Data store id or name
        data_store: String,
    },
    /// List the fields of a schema
    Fields {
        /// Data store id or name
        data_store: String,
        /// Schema id or name
        schema: String,
    },
    /// List the links of a transformation
    Links {
        /// Transformation id or name
        transformation: String,
    },
    /// Report the lineage a proposed link set would break
    BreakingChange {
        /// Transformation id or name
        transformation: String,
        /// JSON file with a {source_field_id, target_field_id} map or a list of them
        #[arg(long)]
        links: PathBuf,
        /// Report per field or per schema
        #[arg(long, default_value = "field")]
        show_by: ShowBy,
        /// Maximum number of impacts to print
        #[arg(long, default_value_t = 25)]
        show: usize,
        /// Also write the impact graph in DOT format
        #[arg(long)]
        dot: Option<PathBuf>,
    },
}

/// Integers are ids, anything else is a name
fn lookup(raw: &str) -> EntityInput {
    match raw.parse::<i64>() {
        Ok(id) => EntityInput::ById(id),
        Err(_) => EntityInput::ByName(raw.to_string()),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CatalogConfig::load_from(cli.config.as_deref())?;
    let catalog = Catalog::from_config(&config).context("connecting to the catalog")?;

    match cli.command {
        Command::Users => {
            for user in catalog.get_users(false)? {
                let record = user.record()?;
                println!(
                    "{:>6}  {:<32} {}",
                    record.id(),
                    record.str_field("email").unwrap_or_default(),
                    record.str_field("name").unwrap_or_default()
                );
            }
        }
        Command::DataStores => {
            for store in catalog.get_data_stores(false)? {
                let record = store.record()?;
                println!(
                    "{:>6}  {:<32} {}",
                    record.id(),
                    record.name().unwrap_or_default(),
                    record.str_field("type").unwrap_or_default()
                );
            }
        }
        Command::Schemas { data_store } => {
            let store = data_store_of(&catalog, &data_store)?;
            for schema in store.get_schemas(false)? {
                let record = schema.record()?;
                println!(
                    "{:>6}  {:<40} {}",
                    record.id(),
                    record.name().unwrap_or_default(),
                    record.str_field("type").unwrap_or_default()
                );
            }
        }
        Command::Fields { data_store, schema } => {
            let store = data_store_of(&catalog, &data_store)?;
            let schema = schema_of(&store, &schema)?;
            for field in schema.get_fields(false)? {
                let record = field.record()?;
                println!(
                    "{:>6}  {:<40} {:<8} {}",
                    record.id(),
                    record.name().unwrap_or_default(),
                    record.str_field("type").unwrap_or_default(),
                    record.str_field("data_type").unwrap_or_default()
                );
            }
        }
        Command::Links { transformation } => {
            let transformation = catalog
                .transformation(lookup(&transformation))?
                .ok_or_else(|| anyhow!("transformation '{}' not found", transformation))?;
            for link in transformation.get_links(false)? {
                let (source, target) = (link.source()?, link.target()?);
                println!(
                    "{:>6}  {}.{} -> {}.{}",
                    link.id().unwrap_or_default(),
                    source.schema_name.unwrap_or_default(),
                    source.field_name.unwrap_or_default(),
                    target.schema_name.unwrap_or_default(),
                    target.field_name.unwrap_or_default()
                );
            }
        }
        Command::BreakingChange {
            transformation,
            links,
            show_by,
            show,
            dot,
        } => {
            let transformation = catalog
                .transformation(lookup(&transformation))?
                .ok_or_else(|| anyhow!("transformation '{}' not found", transformation))?;
            let raw = fs::read_to_string(&links)
                .with_context(|| format!("reading links from {}", links.display()))?;
            let links = LinkInput::try_from(serde_json::from_str::<serde_json::Value>(&raw)?)?;

            let impact = catalog.check_breaking_change(&transformation, links)?;
            println!("{}\n", impact);
            if impact.breaking() {
                println!("{}", impact.all_impact_strings(show_by, show));
            }
            if let Some(path) = dot {
                fs::write(&path, impact.impact_graph().to_dot())?;
                println!("\nWrote impact graph to {}", path.display());
            }
        }
    }

    Ok(())
}

fn data_store_of(catalog: &Catalog, raw: &str) -> Result<Rc<DataStore>> {
    catalog
        .data_store(lookup(raw))?
        .ok_or_else(|| anyhow!("data store '{}' not found", raw))
}

fn schema_of(store: &DataStore, raw: &str) -> Result<Rc<DataSchema>> {
    store
        .schema(lookup(raw))?
        .ok_or_else(|| anyhow!("schema '{}' not found", raw))
}

//! Tessera CLI - run and validate query definitions
//!
//! Usage:
//!   tessera connections
//!   tessera run <definition.json> [--page <n>] [--format table|json|csv]
//!   tessera validate <definition.json>
//!   tessera demo
//!
//! Examples:
//!   tessera run reports/revenue_by_region.json --page 2
//!   tessera run reports/revenue_by_region.json --format csv > revenue.csv
//!   tessera demo

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tessera::cache::CatalogCache;
use tessera::catalog::{CatalogLoader, SchemaCatalog};
use tessera::compose::{PillEdit, Slot};
use tessera::config::{ConnectionRegistry, Settings, SettingsRegistry};
use tessera::execute::{ExecutionGateway, QueryResult};
use tessera::export::write_csv;
use tessera::join::{JoinValidation, JoinValidator};
use tessera::memory::{sales_backend, MemoryDocumentStore, SALES_CONNECTION};
use tessera::query::{Aggregation, FieldRef, QueryDefinition};
use tessera::session::{BuilderServices, ReportBuilder};
use tessera::worker::{WorkerBackend, WorkerClient};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - ad-hoc analytical queries over configured connections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured connections
    Connections,

    /// Validate and execute a query definition
    Run {
        /// Path to the definition JSON file
        file: PathBuf,

        /// Result page to fetch
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Connection to use when the definition names none
        #[arg(short, long)]
        connection: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Check a definition's references and joins without running it
    Validate {
        /// Path to the definition JSON file
        file: PathBuf,

        /// Connection to use when the definition names none
        #[arg(short, long)]
        connection: Option<String>,
    },

    /// Build and run a report against the bundled sample data
    Demo,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Aligned text table with formats applied
    Table,
    /// Raw result as JSON
    Json,
    /// Raw rows as delimited text
    Csv,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.logging.filter);

    let result = match cli.command {
        Commands::Connections => cmd_connections(&settings).await,
        Commands::Run {
            file,
            page,
            connection,
            format,
        } => cmd_run(&settings, &file, page, connection, format).await,
        Commands::Validate { file, connection } => cmd_validate(&settings, &file, connection).await,
        Commands::Demo => cmd_demo(&settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. `RUST_LOG` overrides the configured filter.
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_connections(settings: &Settings) -> Result<(), String> {
    let connections = SettingsRegistry::from_settings(settings).list().await;
    if connections.is_empty() {
        println!("No connections configured.");
        return Ok(());
    }

    println!("Connections:");
    for conn in connections {
        match &conn.default_schema {
            Some(schema) => println!("  - {} ({}, schema {}): {}", conn.id, conn.driver, schema, conn.display_name),
            None => println!("  - {} ({}): {}", conn.id, conn.driver, conn.display_name),
        }
    }
    Ok(())
}

/// A checked definition and the backend it was checked against.
struct Prepared {
    backend: Arc<WorkerBackend>,
    definition: QueryDefinition,
    catalog: SchemaCatalog,
}

async fn prepare(settings: &Settings, file: &Path, connection: Option<String>) -> Result<Prepared, String> {
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Error reading file '{}': {}", file.display(), e))?;
    let mut definition: QueryDefinition = serde_json::from_str(&source)
        .map_err(|e| format!("Invalid definition '{}': {}", file.display(), e))?;

    if connection.is_some() || definition.connection_id.is_none() {
        definition.connection_id = connection
            .or_else(|| settings.default_connection().map(|(id, _)| id.to_string()));
    }
    let connection_id = definition
        .connection_id
        .clone()
        .ok_or("No connection selected. Pass --connection or configure one in tessera.toml")?;

    let client = WorkerClient::spawn_with_settings(settings)
        .await
        .map_err(|e| format!("Worker error: {}", e))?;
    let backend = Arc::new(WorkerBackend::from_settings(Arc::new(client), settings));

    let mut loader = CatalogLoader::new(backend.clone());
    if settings.catalog.cache_enabled {
        match CatalogCache::open() {
            Ok(cache) => loader = loader.with_cache(cache),
            Err(e) => tracing::warn!(error = %e, "catalog cache unavailable"),
        }
    }
    let catalog = loader
        .load(&connection_id)
        .await
        .map_err(|e| format!("Schema error: {}", e))?;

    let issues = definition.validate_against(&catalog);
    if !issues.is_empty() {
        let lines: Vec<String> = issues.iter().map(|i| format!("  {}", i)).collect();
        return Err(format!("Validation errors:\n{}", lines.join("\n")));
    }

    match JoinValidator::new(backend.clone()).validate(&definition).await {
        JoinValidation::Valid => {}
        blocked => {
            let mut message = blocked
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Join validation failed".to_string());
            for join in blocked.suggestions() {
                message.push_str(&format!("\n  suggested join: {} = {}", join.left, join.right));
            }
            return Err(message);
        }
    }

    Ok(Prepared {
        backend,
        definition,
        catalog,
    })
}

async fn cmd_run(
    settings: &Settings,
    file: &Path,
    page: u32,
    connection: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let Prepared {
        backend, definition, ..
    } = prepare(settings, file, connection).await?;

    let mut gateway = ExecutionGateway::new(backend, "cli").with_page_window(settings.query.page_window);
    gateway
        .submit(&definition.with_page(page))
        .await
        .map_err(|e| format!("Query error: {}", e))?;
    let result = gateway.result().ok_or("Query returned no result")?;

    match format {
        OutputFormat::Table => print_table(result, &definition),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        OutputFormat::Csv => {
            let delimiter = settings.export.delimiter_byte().map_err(|e| e.to_string())?;
            let bytes = write_csv(&result.headers, &result.rows, delimiter).map_err(|e| e.to_string())?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }
    Ok(())
}

async fn cmd_validate(settings: &Settings, file: &Path, connection: Option<String>) -> Result<(), String> {
    let prepared = prepare(settings, file, connection).await?;
    println!(
        "OK: {} is valid ({} tables, {} catalog fields)",
        file.display(),
        prepared.definition.referenced_tables().len(),
        prepared.catalog.len()
    );
    Ok(())
}

/// Revenue by region over the bundled Orders/Customers sample.
async fn cmd_demo(settings: &Settings) -> Result<(), String> {
    let backend = Arc::new(sales_backend());
    let services = BuilderServices::from_backend(backend, Arc::new(MemoryDocumentStore::new()));
    let mut builder = ReportBuilder::new("demo", services, settings.query.clone());

    builder
        .select_connection(SALES_CONNECTION)
        .await
        .map_err(|e| e.to_string())?;
    builder
        .add_field(Slot::Groups, &FieldRef::new("Customers", "region"))
        .await
        .map_err(|e| e.to_string())?;
    let amount = builder
        .add_field(Slot::Columns, &FieldRef::new("Orders", "amount"))
        .await
        .map_err(|e| e.to_string())?;
    builder
        .edit_pill(amount, PillEdit::Aggregation(Aggregation::Sum))
        .await
        .map_err(|e| e.to_string())?;

    builder.run(1).await.map_err(|e| e.to_string())?;
    let result = builder.result().ok_or("Query returned no result")?;
    print_table(result, builder.definition());
    Ok(())
}

fn print_table(result: &QueryResult, definition: &QueryDefinition) {
    let rows = result.formatted_rows(&definition.formats);
    let widths: Vec<usize> = result
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(result.headers.as_slice()));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &rows {
        println!("{}", line(row.as_slice()));
    }
    println!();
    println!(
        "page {} of {} ({} rows)",
        result.pagination.current_page, result.pagination.total_pages, result.total_rows
    );
}

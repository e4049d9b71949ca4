use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toolcat_api::RestApi;
use toolcat_core::{AttributeSchema, FilterRequest, FullView};
use toolcat_ingest::SourceExtract;
use toolcat_storage::StorageManager;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Faceted tool catalog
#[derive(Parser, Debug)]
#[command(name = "toolcat")]
#[command(about = "Normalize a tool inventory and query it by facets", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, global = true, env = "TOOLCAT_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Attribute schema JSON file (defaults to the built-in tool schema)
    #[arg(long, global = true, env = "TOOLCAT_SCHEMA")]
    schema: Option<PathBuf>,

    /// Facet cache lifetime in seconds
    #[arg(long, global = true, env = "TOOLCAT_CACHE_TTL_SECS", default_value_t = 300)]
    cache_ttl_secs: u64,

    /// Log level
    #[arg(long, global = true, env = "TOOLCAT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the store from a source extract
    Build {
        /// Wide tool table (.csv or .json)
        #[arg(long, env = "TOOLCAT_SOURCE")]
        source: PathBuf,

        /// Areas table for the direct geography layout
        #[arg(long, env = "TOOLCAT_AREAS")]
        areas: Option<PathBuf>,
    },
    /// Resolve a filter request and print the matching entities
    Query {
        /// Selection as "Group=Label"; repeat for more labels or groups
        #[arg(long = "select", value_parser = parse_selection)]
        selections: Vec<(String, String)>,

        /// Free-text query
        #[arg(long, default_value = "")]
        text: String,

        /// Geography scope
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Geography place name
        #[arg(long = "area")]
        areas: Vec<String>,
    },
    /// Serve the REST API
    Serve {
        /// HTTP API port
        #[arg(long, env = "TOOLCAT_HTTP_PORT", default_value_t = 6380)]
        http_port: u16,
    },
    /// Write the denormalized QA view as CSV
    ExportView {
        #[arg(long)]
        out: PathBuf,
    },
    /// Manage store snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    Create,
    List,
    Restore { name: String },
    Delete { name: String },
}

fn parse_selection(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((group, label)) if !group.trim().is_empty() && !label.trim().is_empty() => {
            Ok((group.trim().to_string(), label.trim().to_string()))
        }
        _ => Err(format!("expected Group=Label, got '{}'", raw)),
    }
}

fn load_schema(path: Option<&Path>) -> anyhow::Result<AttributeSchema> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading schema {}", path.display()))?;
            Ok(AttributeSchema::from_json(&json)?)
        }
        None => Ok(AttributeSchema::tool_catalog()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("toolcat v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);

    let schema = Arc::new(load_schema(args.schema.as_deref())?);
    let storage = Arc::new(StorageManager::open(
        &args.data_dir,
        schema,
        Duration::from_secs(args.cache_ttl_secs),
    )?);
    info!("Storage initialized");

    match args.command {
        Command::Build { source, areas } => {
            let extract = SourceExtract::from_paths(&source, areas.as_deref())?;
            let report = storage.rebuild(&extract)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Query {
            selections,
            text,
            scopes,
            areas,
        } => {
            let mut request = FilterRequest::new()
                .with_text(&text)
                .with_scopes(scopes)
                .with_names(areas);
            for (group, label) in selections {
                request = request.select(&group, [label]);
            }

            let snapshot = storage.catalog().snapshot()?;
            let ids = storage.engine().resolve_ordered(&request)?;
            for id in &ids {
                let name = snapshot
                    .entity(*id)
                    .and_then(|e| e.name.as_deref())
                    .unwrap_or("");
                println!("{}\t{}", id, name);
            }
            info!("{} matching entities", ids.len());
        }
        Command::Serve { http_port } => serve(storage, http_port).await,
        Command::ExportView { out } => {
            let snapshot = storage.catalog().snapshot()?;
            let view = FullView::build(&snapshot, storage.schema());

            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            writer.write_record(&view.headers)?;
            for row in &view.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            info!("Wrote {} rows to {:?}", view.len(), out);
        }
        Command::Snapshot { action } => match action {
            SnapshotAction::Create => {
                let description = storage.create_snapshot()?;
                println!("{}", serde_json::to_string_pretty(&description)?);
            }
            SnapshotAction::List => {
                println!("{}", serde_json::to_string_pretty(&storage.list_snapshots()?)?);
            }
            SnapshotAction::Restore { name } => {
                let build = storage.restore_snapshot(&name)?;
                println!("{}", serde_json::to_string_pretty(&build)?);
            }
            SnapshotAction::Delete { name } => {
                if !storage.delete_snapshot(&name)? {
                    anyhow::bail!("snapshot '{}' not found", name);
                }
            }
        },
    }

    Ok(())
}

async fn serve(storage: Arc<StorageManager>, http_port: u16) {
    let storage_http = storage.clone();
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(storage_http, http_port).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ocirows::config::{parse_region_list, Config, ConnectionConfig};
use ocirows::engine::{QueryContext, ResourceFilter, RowSink};
use ocirows::error::EngineError;
use ocirows::oci::client::OciClient;
use ocirows::oci::http::format_oci_error;
use ocirows::resource::{get_all_resource_keys, get_resource, get_row, run_table, TableOptions};
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Enumerate OCI resources as JSON rows
#[derive(Parser, Debug)]
#[command(name = "ocirows", version = ocirows::VERSION, about, long_about = None)]
struct Args {
    /// Connection to use (defaults to the configured default)
    #[arg(short, long, global = true)]
    connection: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available tables
    Tables,
    /// List every row of a table
    List {
        table: String,
        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<u64>,
        /// Remote filter, `param=value[,value...]`
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<ResourceFilter>,
        /// Hydrate each row with the full resource
        #[arg(long)]
        detail: bool,
    },
    /// Look up one row by OCID
    Get { table: String, id: String },
    /// Write a connection to the config file
    Init {
        /// Tenancy OCID
        #[arg(long)]
        tenancy: String,
        /// Comma separated regions, primary first
        #[arg(long)]
        regions: String,
        /// User OCID owning the API signing key
        #[arg(long)]
        user: Option<String>,
        /// Fingerprint of the API signing key
        #[arg(long)]
        fingerprint: Option<String>,
        /// PEM private key used to sign requests
        #[arg(long)]
        key_file: Option<PathBuf>,
        /// Make this the default connection
        #[arg(long)]
        default: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_filter(expr: &str) -> Result<ResourceFilter, String> {
    ResourceFilter::parse(expr).ok_or_else(|| format!("expected param=value, got {:?}", expr))
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("ocirows started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ocirows").join("ocirows.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".ocirows").join("ocirows.log");
    }
    PathBuf::from("ocirows.log")
}

/// Writes rows to stdout as JSON lines; a closed pipe stops the listing
struct JsonLines<W: Write + Send> {
    out: W,
    broken: bool,
}

impl<W: Write + Send> RowSink<Value> for JsonLines<W> {
    fn emit(&mut self, item: Value) {
        if self.broken {
            return;
        }
        if writeln!(self.out, "{}", item).is_err() {
            self.broken = true;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.broken
    }
}

/// Render an engine error for the terminal
fn describe(err: &EngineError) -> String {
    match err.remote_source() {
        Some(remote) => format!("{} ({})", format_oci_error(remote), err),
        None => err.to_string(),
    }
}

/// Cancel the query on Ctrl-C
fn cancel_on_interrupt(ctx: &QueryContext) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(query_id = %ctx.query_id, "interrupted, cancelling query");
            ctx.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    match args.command {
        Command::Tables => {
            let mut out = io::stdout().lock();
            for key in get_all_resource_keys() {
                if let Some(def) = get_resource(key) {
                    writeln!(out, "{}\t{}", key, def.display_name)?;
                }
            }
            Ok(())
        }
        Command::Init {
            tenancy,
            regions,
            user,
            fingerprint,
            key_file,
            default,
        } => {
            let name = args.connection.unwrap_or_else(|| "default".to_string());
            let mut config = Config::load()?;
            let existing = config.connections.get(&name).cloned().unwrap_or_default();
            let entry = ConnectionConfig {
                tenancy_id: Some(tenancy),
                regions: parse_region_list(&regions),
                user_id: user.or(existing.user_id.clone()),
                fingerprint: fingerprint.or(existing.fingerprint.clone()),
                key_file: key_file.or(existing.key_file.clone()),
                ..existing
            };
            // validate before writing
            entry.clone().into_connection(&name)?;
            config.connections.insert(name.clone(), entry);
            if default {
                config.default_connection = Some(name);
            }
            config.save()
        }
        Command::List {
            table,
            limit,
            filters,
            detail,
        } => {
            let connection = Config::load()?.connection(args.connection.as_deref())?.into_shared();
            let client = Arc::new(OciClient::new(&connection)?);
            let ctx = QueryContext::new(connection, limit);
            cancel_on_interrupt(&ctx);

            let options = TableOptions { filters, detail };
            let mut sink = JsonLines {
                out: io::stdout(),
                broken: false,
            };
            match run_table(&ctx, &client, &table, &options, &mut sink).await {
                Ok(summary) => {
                    tracing::info!("{}", serde_json::to_string(&summary)?);
                    Ok(())
                }
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => anyhow::bail!(describe(&err)),
            }
        }
        Command::Get { table, id } => {
            let connection = Config::load()?.connection(args.connection.as_deref())?.into_shared();
            let client = Arc::new(OciClient::new(&connection)?);
            let ctx = QueryContext::new(connection, None);
            cancel_on_interrupt(&ctx);

            match get_row(&ctx, &client, &table, &id).await {
                Ok(Some(row)) => {
                    println!("{}", row);
                    Ok(())
                }
                Ok(None) => anyhow::bail!("{} not found in {}", id, table),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => anyhow::bail!(describe(&err)),
            }
        }
    }
}

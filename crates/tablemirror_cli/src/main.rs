//! tablemirror CLI
//!
//! Drives the mirror service from the command line. Every command is routed
//! through the same dispatch an HTTP listener would use, and prints the JSON
//! response body.
//!
//! # Commands
//!
//! - `sync` - Mirror an upstream table
//! - `records` / `record` - Query mirrored records
//! - `people` / `tasks` - Convenience listings
//! - `webhook` - Ingest a change notification
//! - `events` - Show recent webhook deliveries
//! - `root` / `health` - Service description and liveness

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::records::ListArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use tablemirror_sync_server::{EnvFile, Settings};
use tracing_subscriber::EnvFilter;

/// Mirror an upstream table API into a local SQLite store.
#[derive(Parser)]
#[command(name = "tablemirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mirror database URL
    #[arg(global = true, long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Upstream API key
    #[arg(global = true, long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Upstream base identifier
    #[arg(global = true, long, env = "AIRTABLE_BASE_ID")]
    base_id: Option<String>,

    /// Shared webhook secret
    #[arg(global = true, long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Reject webhook timestamps further than this many seconds from now
    #[arg(global = true, long, env = "WEBHOOK_MAX_SKEW_SECS")]
    webhook_max_skew_secs: Option<u64>,

    /// Dotenv file consulted for settings missing from flags and environment
    #[arg(global = true, long, default_value = EnvFile::DEFAULT_PATH)]
    env_file: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Log format
    #[arg(global = true, long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror every page of an upstream table
    Sync {
        /// Upstream table name
        table: String,
    },

    /// List mirrored records
    Records {
        /// Only records of this table
        #[arg(short, long)]
        table: Option<String>,

        #[command(flatten)]
        list: ListArgs,

        /// Sort column (id, record_id, table_name, created_at, updated_at)
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort order (asc, desc)
        #[arg(long)]
        sort_order: Option<String>,
    },

    /// Show one record by upstream identity
    Record {
        /// Upstream record identity
        id: String,
    },

    /// List records of the people table
    People {
        #[command(flatten)]
        list: ListArgs,
    },

    /// List records of the tasks table
    Tasks {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Ingest a webhook change notification
    Webhook {
        /// File holding the raw body, or `-` for stdin
        #[arg(short, long)]
        body: PathBuf,

        /// Signature header value
        #[arg(short, long)]
        signature: Option<String>,

        /// Timestamp header value
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Show recent webhook deliveries, newest first
    Events {
        /// Maximum number of events
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the service description
    Root,

    /// Show service health
    Health,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

impl Cli {
    fn settings(&self) -> Result<Settings, Box<dyn std::error::Error>> {
        let file = EnvFile::load(&self.env_file)?;
        let settings = Settings::from_lookup(|key| {
            let flag = match key {
                Settings::API_KEY_VAR => self.api_key.clone(),
                Settings::BASE_ID_VAR => self.base_id.clone(),
                Settings::DATABASE_URL_VAR => self.database_url.clone(),
                Settings::WEBHOOK_SECRET_VAR => self.webhook_secret.clone(),
                Settings::WEBHOOK_MAX_SKEW_VAR => self.webhook_max_skew_secs.map(|s| s.to_string()),
                _ => None,
            };
            flag.or_else(|| std::env::var(key).ok())
                .or_else(|| file.get(key))
        })?;
        Ok(settings)
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let settings = cli.settings()?;
    let context = commands::Context::open(&settings)?;

    let request = match cli.command {
        Commands::Sync { table } => commands::sync::request(&table),
        Commands::Records {
            table,
            list,
            sort_by,
            sort_order,
        } => commands::records::list_request(
            table.as_deref(),
            &list,
            sort_by.as_deref(),
            sort_order.as_deref(),
        ),
        Commands::Record { id } => commands::records::record_request(&id),
        Commands::People { list } => commands::records::table_request("people", &list),
        Commands::Tasks { list } => commands::records::table_request("tasks", &list),
        Commands::Webhook {
            body,
            signature,
            timestamp,
        } => {
            let body = commands::webhook::read_body(&body)?;
            commands::webhook::request(body, signature.as_deref(), timestamp.as_deref())
        }
        Commands::Events { limit } => commands::records::events_request(limit),
        Commands::Root => commands::info::root_request(),
        Commands::Health => commands::info::health_request(),
    };

    context.execute(&request)
}

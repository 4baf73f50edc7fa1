//! azurefs -- command-line access to an Azure File share.
//!
//! Every adapter operation is exposed as a subcommand.  Attribute records
//! are printed as JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use garde::Validate;
use tracing::info;

use azurefs::config::{Config, LoggingConfig, ShareConfig};
use azurefs::{AzureFileAdapter, WriteConfig};

/// Command-line arguments for the azurefs CLI.
#[derive(Parser, Debug)]
#[command(name = "azurefs", version, about = "Azure File Storage filesystem adapter")]
struct Cli {
    /// Path to a YAML configuration file.  Without one, the share comes
    /// from `--share` and credentials from the environment.
    #[arg(short, long)]
    config: Option<String>,

    /// Share name (overrides the configuration file).
    #[arg(short, long)]
    share: Option<String>,

    /// Path prefix to scope every operation under.
    #[arg(short, long)]
    prefix: Option<String>,

    /// Print Prometheus metrics to stderr when done.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory.
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// Descend into sub-directories.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print a file to stdout.
    Cat { path: String },
    /// Upload a local file, or stdin when no file is given.
    Put {
        path: String,
        file: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        cache_control: Option<String>,
    },
    /// Delete a file.
    Rm { path: String },
    /// Delete a directory, with everything below it unless recursive
    /// delete is disabled in the configuration.
    Rmdir { path: String },
    /// Create a directory and its ancestors.
    Mkdir { path: String },
    /// Move a file.
    Mv { source: String, destination: String },
    /// Copy a file.
    Cp { source: String, destination: String },
    /// Print file or directory attributes.
    Stat { path: String },
    /// Print whether a file or directory exists.
    Exists { path: String },
    /// Print the absolute URL of a path.
    Url { path: String },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => azurefs::config::load_config(path)?,
        None => {
            let share = cli
                .share
                .clone()
                .or_else(|| std::env::var("AZURE_STORAGE_SHARE").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("No share given. Use --config, --share or AZURE_STORAGE_SHARE.")
                })?;
            Config {
                share: ShareConfig::new(&share),
                logging: LoggingConfig::default(),
            }
        }
    };
    if let Some(share) = &cli.share {
        config.share.share_name = share.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.share.prefix = prefix.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(adapter: &AzureFileAdapter, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ls { path, recursive } => {
            print_json(&adapter.list_contents(&path, recursive).await?)?;
        }
        Command::Cat { path } => {
            let mut file = adapter.read_stream(&path).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut file, &mut stdout).await?;
        }
        Command::Put {
            path,
            file,
            content_type,
            cache_control,
        } => {
            let mut config = WriteConfig::new();
            if let Some(content_type) = content_type {
                config = config.with("mimetype", content_type);
            }
            if let Some(cache_control) = cache_control {
                config = config.with("CacheControl", cache_control);
            }
            let attrs = match file {
                Some(local) => {
                    let reader = tokio::fs::File::open(&local).await?;
                    adapter.write_stream(&path, reader, &config).await?
                }
                None => adapter.write_stream(&path, tokio::io::stdin(), &config).await?,
            };
            print_json(&attrs)?;
        }
        Command::Rm { path } => adapter.delete(&path).await?,
        Command::Rmdir { path } => adapter.delete_directory(&path).await?,
        Command::Mkdir { path } => adapter.create_directory(&path).await?,
        Command::Mv {
            source,
            destination,
        } => adapter.move_file(&source, &destination).await?,
        Command::Cp {
            source,
            destination,
        } => adapter.copy(&source, &destination).await?,
        Command::Stat { path } => print_json(&adapter.metadata(&path).await?)?,
        Command::Exists { path } => println!("{}", adapter.has(&path).await?),
        Command::Url { path } => println!("{}", adapter.get_url(&path)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    init_tracing(&config.logging);

    if cli.metrics {
        azurefs::metrics::init_metrics()?;
        azurefs::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let adapter = AzureFileAdapter::from_config(&config.share)?;
    let result = run(&adapter, cli.command).await;

    if let Some(rendered) = azurefs::metrics::render() {
        eprintln!("{}", rendered);
    }

    result
}

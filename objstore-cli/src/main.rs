mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use objstore::{
    BlobStorage, CancellationToken, DirectorySecretResolver, SecretResolver, StaticSecretResolver,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{default_config_path, CliConfig};

#[derive(Parser, Debug)]
#[command(name = "objstore")]
#[command(about = "objstore CLI - read and write S3, GCS, Azure and local backends")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.objstore/config.toml)
    #[arg(long, short, env = "OBJSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace of the credentials secret (overrides config)
    #[arg(long, short)]
    namespace: Option<String>,

    /// Log as JSON (overrides config)
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether an object exists
    Exists {
        path: String,
    },

    /// Print an object to stdout or save it to a file
    Get {
        path: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file, or stdin when no file is given
    Put {
        path: String,

        /// Input file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Content type to store with the object
        #[arg(long, default_value = "")]
        content_type: String,
    },

    /// Print the contents of every file below a directory
    Cat {
        #[arg(default_value = "")]
        dir: String,
    },

    /// List directories below a directory
    Dirs {
        #[arg(default_value = "")]
        dir: String,

        /// Levels below the immediate children to include (-1: all)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        depth: i32,
    },

    /// Delete an object, or a directory with --dir
    Rm {
        path: String,

        /// Delete everything below the path
        #[arg(long)]
        dir: bool,
    },

    /// Create an empty directory marker
    Mkdir {
        path: String,
    },

    /// Upload and remove a test object to verify access
    Check {
        #[arg(default_value = "objstore-access-check.txt")]
        path: String,
    },
}

fn init_logging(config: &CliConfig, json: bool) -> Result<()> {
    let log_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let writer = match &config.logging.file {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(writer);
    if json || config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn read_input(input: Option<&PathBuf>) -> Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;
            Ok(data)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = CliConfig::load(&config_path)?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }

    init_logging(&config, cli.json_logs)?;

    let resolver: Box<dyn SecretResolver> = match &config.secrets_dir {
        Some(dir) => Box::new(DirectorySecretResolver::new(dir)),
        None => Box::new(StaticSecretResolver::new()),
    };
    let storage = BlobStorage::new(resolver.as_ref(), &config.namespace, &config.backend).await?;
    tracing::debug!("Using {}", storage.factory().storage_url());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Exists { path } => {
            let found = storage.exists(&path, &cancel).await?;
            println!("{}", found);
            if !found {
                std::process::exit(1);
            }
        }
        Commands::Get { path, output } => {
            let data = storage.get(&path, &cancel).await?;
            match output {
                Some(file) => {
                    tokio::fs::write(&file, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", file.display()))?;
                    tracing::info!("Saved {} bytes to {}", data.len(), file.display());
                }
                None => std::io::stdout().write_all(&data)?,
            }
        }
        Commands::Put {
            path,
            input,
            content_type,
        } => {
            let data = read_input(input.as_ref()).await?;
            storage.upload(&path, &data, &content_type, &cancel).await?;
            tracing::info!("Uploaded {} bytes to {}", data.len(), path);
        }
        Commands::Cat { dir } => {
            let objects = storage.list(&dir, &cancel).await?;
            let mut stdout = std::io::stdout().lock();
            for object in objects {
                stdout.write_all(&object)?;
            }
        }
        Commands::Dirs { dir, depth } => {
            for key in storage.list_dir_n(&dir, depth, &cancel).await? {
                println!("{}", key);
            }
        }
        Commands::Rm { path, dir } => {
            storage.delete(&path, dir, &cancel).await?;
            tracing::info!("Deleted {}", path);
        }
        Commands::Mkdir { path } => {
            storage.mark_as_directory(&path, &cancel).await?;
            tracing::info!("Created directory marker for {}", path);
        }
        Commands::Check { path } => {
            storage
                .check_access(&path, b"objstore access check", "text/plain", &cancel)
                .await?;
            println!("ok");
        }
    }

    Ok(())
}

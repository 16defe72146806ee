//! Local storage - Entry Point
//!
//! Command line access to a storage adapter confined to one root directory.

use clap::{Parser, Subcommand};
use futures::StreamExt;
use log::{LevelFilter, error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{self, AsyncWriteExt};

use local_storage::error::handlers::{error_to_exit_code, handle_error};
use local_storage::utils::logging::setup_logging;
use local_storage::{
    AdapterConfig, LocalAdapter, ReadOptions, StorageError, StorageResult, WriteContent,
    WriteOptions,
};

#[derive(Debug, Parser)]
#[command(name = "local-storage", version, about = "File access confined to a root directory")]
struct Cli {
    /// Configuration file (extension optional), defaults to ./config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured storage root
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a file
    Read { file: String },
    /// Stream a file to stdout chunk by chunk
    Cat {
        file: String,
        /// First byte offset to stream
        #[arg(long)]
        start: Option<u64>,
        /// Last byte offset to stream (inclusive)
        #[arg(long)]
        end: Option<u64>,
    },
    /// Show file metadata
    Info { file: String },
    /// Check whether a file exists
    Exists { file: String },
    /// Write a file from --content or stdin
    Write {
        file: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a file
    Remove { file: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging(LevelFilter::Warn);

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AdapterConfig::load_from(path),
        None => AdapterConfig::load(),
    };

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(root) = cli.root {
        config.storage_root = root.to_string_lossy().into_owned();
    }

    match run(&config, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            handle_error(&e);
            ExitCode::from(error_to_exit_code(&e))
        }
    }
}

async fn run(config: &AdapterConfig, command: Command) -> StorageResult<()> {
    let adapter = LocalAdapter::from_config(config).await?;
    let mut stdout = io::stdout();

    match command {
        Command::Read { file } => {
            let data = adapter.read(&file).await?;
            stdout.write_all(&data).await.map_err(stdout_error)?;
        }
        Command::Cat { file, start, end } => {
            let path = adapter.resolve(&file).await?;
            let options = ReadOptions { start, end };
            let mut stream = adapter.create_read_stream(&file, &options).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StorageError::io(path.as_path(), e))?;
                stdout.write_all(&chunk).await.map_err(stdout_error)?;
            }
        }
        Command::Info { file } => {
            let meta = adapter.read_info(&file).await?;
            let created = meta
                .created_millis()
                .map(|millis| millis.to_string())
                .unwrap_or_else(|| "-".to_string());
            let report = format!(
                "mime_type: {}\ncreated: {}\nmodified: {}\nsize: {}\n",
                meta.mime_type,
                created,
                meta.modified_millis(),
                meta.size
            );
            stdout
                .write_all(report.as_bytes())
                .await
                .map_err(stdout_error)?;
        }
        Command::Exists { file } => {
            let exists = adapter.exists(&file).await?;
            stdout
                .write_all(format!("{exists}\n").as_bytes())
                .await
                .map_err(stdout_error)?;
        }
        Command::Write {
            file,
            content,
            overwrite,
        } => {
            let content = match content {
                Some(text) => WriteContent::from(text),
                None => WriteContent::reader(io::stdin()),
            };
            let options = WriteOptions {
                overwrite,
                ..WriteOptions::default()
            };
            let meta = adapter.write(&file, content, &options).await?;
            info!("Wrote {} ({} bytes)", file, meta.size);
        }
        Command::Remove { file } => {
            adapter.remove(&file).await?;
        }
    }

    stdout.flush().await.map_err(stdout_error)
}

fn stdout_error(e: std::io::Error) -> StorageError {
    StorageError::io("<stdout>", e)
}

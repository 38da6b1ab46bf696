use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docmeta_common::{ArchiveHandle, Config};
use docmeta_pipeline::{bootstrap, list_archives, run_service, BatchOutcome};
use docmeta_storage::FsStore;

#[derive(Parser)]
#[command(name = "docmeta", about = "OCR and caption the documents inside zip archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every archive in storage once
    Run {
        /// Skip archives that already have a sidecar
        #[arg(long)]
        only_new: bool,
    },
    /// Process archives on a fixed interval until interrupted
    Serve,
    /// Process a single local zip file
    Archive {
        path: PathBuf,
        /// Where to write the sidecar (defaults to next to the archive)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the archive keys a run would process
    List {
        #[arg(long)]
        only_new: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    match cli.command {
        Command::Run { only_new } => {
            let orchestrator = bootstrap::orchestrator(&config)?;
            match orchestrator.run_batch(only_new || config.service.only_new).await? {
                BatchOutcome::Completed(stats) => info!("Run complete. {stats}"),
                BatchOutcome::Skipped => info!("Run skipped"),
            }
        }
        Command::Serve => {
            let orchestrator = Arc::new(bootstrap::orchestrator(&config)?);
            run_service(
                orchestrator,
                config.service.interval,
                config.service.only_new,
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
            )
            .await?;
        }
        Command::Archive { path, out } => process_local(&config, path, out).await?,
        Command::List { only_new } => {
            let storage = bootstrap::storage(&config);
            for handle in list_archives(storage.as_ref(), only_new || config.service.only_new).await? {
                println!("{handle}");
            }
        }
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("docmeta=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn process_local(config: &Config, path: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;

    let handle = ArchiveHandle::new(name)?;
    let processor = bootstrap::processor(config, Arc::new(FsStore::new(&dir)))?;

    let metadata = match out {
        None => processor.run(&handle).await?.metadata,
        Some(out) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let metadata = processor.process_archive(bytes.into(), &handle).await?;
            tokio::fs::write(&out, metadata.to_json_bytes()?)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            metadata
        }
    };

    println!("{}", String::from_utf8_lossy(&metadata.to_json_bytes()?));
    Ok(())
}

//! rhfs command-line client entry point.

mod cli;
mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use rhfs_data_channel::{DataClient, DataServer, MemoryDataService};
use rhfs_transfer::TransferClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FS_USAGE, FsCommand, USAGE};
use crate::config::Config;

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so listings and progress on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::parse(&args)? {
        Command::Usage => {
            println!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        Command::FsUsage => {
            println!("{FS_USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Fs(command) => run_fs(&command),
        Command::Serve { addr } => serve(addr),
    }
}

fn run_fs(command: &FsCommand) -> anyhow::Result<ExitCode> {
    let config = Config::load()?;
    let client = DataClient::connect(&config.address(), config.client_options())?;
    let transfer = TransferClient::new(client, config.auth())
        .with_write_buffer(config.write_buffer_size)
        .with_block_size(config.put_block_size);

    let ok = commands::run_fs(&transfer, command, &mut std::io::stdout().lock())?;
    transfer.into_service().shutdown()?;

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Hosts an in-memory data service until interrupted.
fn serve(addr: Option<String>) -> anyhow::Result<ExitCode> {
    let addr = match addr {
        Some(addr) => addr,
        None => Config::load()?.address(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let listener = DataServer::<MemoryDataService>::listen(&addr).await?;
        println!("serving in-memory data service on {}", listener.local_addr()?);

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("interrupt received");
                    ctrl_c.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "cannot listen for interrupts"),
            }
        });

        let server = DataServer::new(Arc::new(MemoryDataService::new()), cancel);
        server.serve(listener).await?;
        anyhow::Ok(())
    })?;

    Ok(ExitCode::SUCCESS)
}

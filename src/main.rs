use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use tokio::{signal, task};
use tokio_util::sync::CancellationToken;

use experiments::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, stopping at the next batch");
                interrupt.cancel();
            }
            Err(e) => warn!("cannot listen for SIGINT: {e}"),
        }
    });

    task::spawn_blocking(move || cli.run(&cancel))
        .await
        .context("the experiment panicked")??;

    Ok(())
}

mod app;
mod config;
mod k8s;
mod kube_client;

use anyhow::Result;
use clap::Parser;
use utils::version;

use crate::config::Cli;
use crate::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
    }
}

async fn run_daemon(daemon_args: crate::config::DaemonArgs) -> Result<()> {
    utils::logging::init();

    tracing::info!("Starting gang-scheduler group controller {}", &**version::VERSION);

    app::run(daemon_args).await
}

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{debug, error, info};

use stwatch_service::{Config, Watcher};

/// stwatch - Survey Tool fleet watcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "stwatch")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "STWATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll once, wait for the results and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            logger::init(false);
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    if cli.print_config {
        println!("{config}");
        return;
    }

    logger::init(config.watcher.verbose);
    debug!("Effective configuration:\n{}", config);

    if let Err(e) = run(config, cli.once).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(config: Config, once: bool) -> anyhow::Result<()> {
    let (watcher, handle) = Watcher::open(&config).await?;

    if once {
        let task = watcher.spawn();
        handle.poll().await?;
        handle.settle().await?;
        handle.shutdown().await?;
        task.await?;
        return Ok(());
    }

    let task = watcher.spawn_scheduled();
    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

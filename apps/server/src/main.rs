#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use stwatch_service::{Config, Watcher, WatcherHandle};
use tracing::info;

mod error;
mod routes;

use error::AppError;

/// stwatch-server - Survey Tool fleet watcher with its read API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "stwatch-server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "STWATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overrides `http.bind`
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,
}

impl Cli {
    /// Explicit path first, then the `.env` value baked in at build time.
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| option_env!("STWATCH_CONFIG").map(PathBuf::from))
    }
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config_path())?;
    logger::init(config.watcher.verbose);
    tracing::debug!("Effective configuration:\n{}", config);

    let bind = cli.bind.unwrap_or_else(|| config.http.bind.clone());
    let (watcher, handle) = Watcher::open(&config).await?;
    let task = watcher.spawn_scheduled();

    run_server(&bind, handle.clone()).await?;

    info!("HTTP server stopped, shutting down the watcher");
    handle.shutdown().await?;
    task.await.map_err(|e| AppError::Startup(e.into()))?;
    Ok(())
}

async fn run_server(bind: &str, handle: WatcherHandle) -> Result<(), AppError> {
    info!("Serving read API on {}", bind);
    let handle = web::Data::new(handle);
    HttpServer::new(move || App::new().app_data(handle.clone()).configure(routes::routes))
        .bind(bind)?
        .run()
        .await?;

    Ok(())
}

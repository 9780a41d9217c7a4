use clap::Parser;
use std::sync::Arc;

mod config;
mod error;
mod handler;
mod http;
mod logger;
mod relay;
mod server;

/// Short-link file relay
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to an optional ./config.toml)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = config::Config::load_from(cli.config.as_deref())?;
    logger::init(&cfg)?;

    // Worker threads default to the number of CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;
    let state = Arc::new(config::AppState::new(cfg).await?);

    logger::log_server_start(&addr, &state.config);

    server::start_server_loop(listener, state, server::shutdown_signal()).await
}

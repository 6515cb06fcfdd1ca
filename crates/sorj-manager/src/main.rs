mod cli;
mod error;
mod server;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use sorj_core::Manager;

use crate::cli::Cli;
use crate::error::StartupError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(sorj_config::config_path);
    let config_error = |err: sorj_config::ConfigError| {
        StartupError::from_config(err, config_file.display().to_string())
    };

    let settings = sorj_config::load_settings(Some(&config_file)).map_err(config_error)?;
    let addr = match cli.bind {
        Some(addr) => addr,
        None => settings.bind_addr().map_err(config_error)?,
    };
    let manager = Manager::new(settings.manager_config().map_err(config_error)?)?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, server::router(manager))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

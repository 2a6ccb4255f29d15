use clap::Parser;
use place_orders::adapters::api_server::start_api_server;
use place_orders::agent::run_agent;
use place_orders::cli::{check_order_file, Cli, Commands};
use place_orders::config::{AppConfig, LoggingConfig};
use place_orders::coordination::{wait_for_os_signal, Shutdown};
use place_orders::error::{PlaceError, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Validate { image } = &cli.command {
        init_logging_simple();
        return match check_order_file(image).await? {
            Ok(()) => {
                println!("✓ {} is a valid order", image.display());
                Ok(())
            }
            Err(rejection) => {
                println!("✗ {}", rejection);
                Err(rejection.into())
            }
        };
    }

    let mut config = AppConfig::load_from(&cli.config)?;
    match &cli.command {
        Commands::Serve { bind: Some(bind) } => config.server.bind = bind.clone(),
        Commands::Agent { brand, server } => {
            if let Some(brand) = brand {
                config.agent.brand = brand.clone();
            }
            if let Some(server) = server {
                config.agent.command_url = server.clone();
            }
        }
        _ => {}
    }

    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        return Err(PlaceError::Validation(errors.join("; ")));
    }

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { wait_for_os_signal(&shutdown).await });
    }

    match cli.command {
        Commands::Serve { .. } => {
            info!("Starting command server");
            start_api_server(&config.server, shutdown.listener()).await?;
        }
        Commands::Agent { .. } => {
            info!(brand = %config.agent.brand, "Starting painting agent");
            run_agent(&config.agent, shutdown.listener()).await?;
        }
        Commands::Validate { .. } => {}
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},place_orders=debug", config.level)));

    // File logging only when PLACE_LOG_DIR is set.
    //
    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so writability is checked first.
    let log_dir = std::env::var("PLACE_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Could not create log directory {} ({}), file logging disabled", log_dir, e);
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".place_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(log_dir, "place-orders.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let (console_layer, json_layer) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/place-orders.log", dir);
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

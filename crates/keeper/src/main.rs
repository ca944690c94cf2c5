use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchpad_keeper::config::create_example_config;
use launchpad_keeper::{Keeper, KeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "launchpad-keeper")]
#[command(about = "Fair-launch lifecycle keeper: deployments, heat and reward rounds")]
struct Cli {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,

    /// Write an example configuration to this path and exit
    #[arg(long)]
    example_config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level.as_deref().unwrap_or("info"));

    if let Some(path) = cli.example_config {
        create_example_config(&path)?;
        info!("Example configuration written to {}", path);
        return Ok(());
    }

    // Load configuration
    let config = if std::path::Path::new(&cli.config).exists() {
        KeeperConfig::load(&cli.config)?
    } else {
        warn!("Config file not found, using defaults: {}", cli.config);
        KeeperConfig::default()
    };
    config.validate()?;

    info!("Starting launchpad keeper");
    info!("Relayer: {}", config.upstream.relayer_url);
    info!("Webhook endpoint: {}{}", config.webhook.bind_address, config.webhook.path);
    info!("Deployment workers: {}", config.deployment.workers);

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let secret = config.webhook.load_secret()?;
    let keeper = Keeper::from_config(config)?;

    match keeper.health_check().await {
        Ok(report) => info!(?report, "Keeper initialized successfully"),
        Err(e) => warn!("Health check warning: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    info!("Keeper started. Press Ctrl+C to shutdown.");
    keeper.run(secret, shutdown_rx).await?;

    info!("Shutting down launchpad keeper");
    Ok(())
}

fn init_logging(level: &str) {
    let log_level = level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("launchpad_keeper={},tower_http=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

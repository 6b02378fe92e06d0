use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use herald::client::MatrixClient;
use herald::config::BotConfig;
use herald::feed::FeedFetcher;
use herald::service::rss::{self, RssService};
use herald::service::Service;
use herald::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "herald", about = "Matrix bot that announces feed updates to rooms")]
struct Args {
    /// Path to the bot configuration file
    #[arg(long, default_value = "herald.toml")]
    config: PathBuf,

    /// Run a single poll cycle and exit (for cron-style deployments)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = BotConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    let db = Database::open(&config.bot.database)
        .await
        .context("failed to open database")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let chat = Arc::new(MatrixClient::new(
        http.clone(),
        &config.bot.homeserver,
        config.bot.access_token,
    ));
    let fetcher = FeedFetcher::new(http);

    let service = RssService::new(
        "rssbot",
        rss::service_config_from(&config.rss),
        fetcher,
        chat,
        Arc::new(db),
    )
    .context("invalid feed configuration")?;
    service
        .register()
        .await
        .context("failed to register feed service")?;

    let services: Vec<Arc<dyn Service>> = vec![Arc::new(service)];
    tracing::info!(
        services = services.len(),
        user = %config.bot.user_id,
        "herald started"
    );

    if args.once {
        for service in &services {
            service.on_poll().await;
        }
        return Ok(());
    }

    let tick = Duration::from_secs(config.bot.poll_tick_seconds.max(1));
    let mut timer = tokio::time::interval(tick);
    loop {
        timer.tick().await;
        futures::future::join_all(services.iter().map(|s| s.on_poll())).await;
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use forum_driver::{Credentials, ForumDriver, SiteConfig};
use scrapeboard_core::artifact::ArtifactStore;
use scrapeboard_core::ledger::StatusLedger;
use scrapeboard_core::{Orchestrator, OrchestratorConfig};

#[derive(Parser)]
#[command(
    name = "scrapeboard-server",
    about = "Scrape job orchestrator and status service",
    version
)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value = "3141", env = "SCRAPEBOARD_PORT")]
    port: u16,

    /// Directory for the status ledger and artifacts
    #[arg(long, default_value = "data", env = "SCRAPEBOARD_DATA_DIR")]
    data_dir: PathBuf,

    /// Path to the site configuration (YAML)
    #[arg(long, env = "SCRAPEBOARD_SITE_CONFIG")]
    site_config: PathBuf,

    /// Override the site config's SOCKS proxy endpoint
    #[arg(long, env = "SCRAPEBOARD_PROXY_URL")]
    proxy_url: Option<String>,

    /// Cooldown between accepted triggers per user and kind, in seconds
    #[arg(long, default_value = "3600", env = "SCRAPEBOARD_COOLDOWN_SECS")]
    cooldown_secs: u64,

    /// Ceiling on a single run, in seconds
    #[arg(long, default_value = "3600", env = "SCRAPEBOARD_RUN_TIMEOUT_SECS")]
    run_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut site = SiteConfig::load(&cli.site_config)
        .with_context(|| format!("loading site config from {}", cli.site_config.display()))?;
    if let Some(proxy_url) = cli.proxy_url {
        site.proxy_url = proxy_url;
    }
    let credentials = Credentials::from_env().context("reading forum credentials")?;

    // An unreachable proxy at boot is unrecoverable: exit non-zero rather
    // than serve start requests that can only fail.
    let driver = ForumDriver::new(site, credentials);
    driver
        .probe()
        .await
        .context("probing the proxy circuit")?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;
    let ledger = Arc::new(StatusLedger::open(&cli.data_dir.join("ledger.redb"))?);
    let artifacts = Arc::new(ArtifactStore::open(&cli.data_dir.join("artifacts"))?);

    // Orphan reconciliation happens inside Orchestrator::new, before the
    // listener binds.
    let orchestrator = Arc::new(Orchestrator::new(
        ledger,
        artifacts,
        Arc::new(driver),
        OrchestratorConfig {
            cooldown: Duration::from_secs(cli.cooldown_secs),
            run_timeout: Duration::from_secs(cli.run_timeout_secs),
        },
    )?);

    scrapeboard_server::serve(orchestrator, cli.port).await
}

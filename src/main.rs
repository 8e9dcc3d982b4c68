use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use telewatch::data::{parse_duration, parse_instant};
use telewatch::{Dashboard, HistoryReport, Overrides, Settings};
use telewatch_poller::{FetchOutcome, HistoricalRangeFetcher, QueryRange};
use telewatch_types::decode_aggregate;
use telewatch_proxy::ProxyServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Span of `history` when neither --start nor --last is given.
const DEFAULT_HISTORY_SPAN: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(name = "telewatch")]
#[command(about = "Headless watcher for spacecraft telemetry", version)]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the telemetry API (e.g., "http://localhost:8090")
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log filter used when RUST_LOG is unset (e.g., "info", "telewatch_poller=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll live values and anomalies, printing each update
    Watch {
        /// Current-value polling interval (e.g., "1s", "500ms")
        #[arg(long)]
        current_interval: Option<String>,

        /// Anomaly polling interval
        #[arg(long)]
        anomaly_interval: Option<String>,

        /// Width of each anomaly query window; must exceed the anomaly interval
        #[arg(long)]
        window: Option<String>,
    },

    /// Fetch the packets in a time range and summarise them.
    /// Without --start or --last, covers the hour before --end
    History {
        /// Range start, RFC 3339 (e.g., "2024-06-10T06:00:00Z")
        #[arg(long, conflicts_with = "last")]
        start: Option<String>,

        /// Range end, RFC 3339. Defaults to now
        #[arg(long)]
        end: Option<String>,

        /// Trailing range ending at --end (e.g., "15m")
        #[arg(long)]
        last: Option<String>,

        /// Also fetch the upstream's own aggregate for the range
        #[arg(long)]
        server_stats: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Serve the read-only HTTP proxy in front of the telemetry API
    Proxy {
        /// Address to listen on (e.g., "127.0.0.1:3000")
        #[arg(long)]
        listen: Option<String>,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            base_url: self.base_url.clone(),
            log_level: self.log_level.clone(),
            ..Default::default()
        };
        match &self.command {
            Command::Watch {
                current_interval,
                anomaly_interval,
                window,
            } => {
                overrides.current_interval = current_interval.clone();
                overrides.anomaly_interval = anomaly_interval.clone();
                overrides.anomaly_window = window.clone();
            }
            Command::Proxy { listen } => overrides.listen_addr = listen.clone(),
            Command::History { .. } => {}
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref(), &args.overrides())?;

    // Logs go to stderr so stdout stays clean for reports
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Watch { .. } => run_watch(&settings).await,
        Command::History {
            start,
            end,
            last,
            server_stats,
            json,
        } => run_history(&settings, start, end, last, server_stats, json).await,
        Command::Proxy { .. } => run_proxy(&settings).await,
    }
}

async fn run_watch(settings: &Settings) -> Result<()> {
    let source = Arc::new(settings.upstream_client()?);
    let dashboard = Dashboard::new(settings, source)?;

    let mut stdout = io::stdout();
    let summary = dashboard.run(&mut stdout, ctrl_c()).await?;
    info!(
        current_updates = summary.current_updates,
        anomalies = summary.anomalies,
        feed_errors = summary.feed_errors,
        "Stopped watching"
    );
    Ok(())
}

async fn run_history(
    settings: &Settings,
    start: Option<String>,
    end: Option<String>,
    last: Option<String>,
    server_stats: bool,
    json: bool,
) -> Result<()> {
    let end = match end {
        Some(end) => parse_instant(&end)?,
        None => chrono::Utc::now(),
    };
    let range = match (start, last) {
        (Some(start), _) => QueryRange::new(parse_instant(&start)?, end),
        (None, Some(last)) => QueryRange::trailing(end, parse_duration(&last)?),
        (None, None) => QueryRange::trailing(end, DEFAULT_HISTORY_SPAN),
    };

    let source = Arc::new(settings.upstream_client()?);
    let fetcher = HistoricalRangeFetcher::new(source.clone())
        .with_request_timeout(settings.upstream.request_timeout)?;

    let packets = match fetcher
        .fetch(range)
        .await
        .with_context(|| format!("Failed to fetch {range}"))?
    {
        FetchOutcome::Applied(packets) => packets,
        FetchOutcome::Superseded => bail!("Request for {range} was superseded"),
    };

    let server = if server_stats {
        let raw = source
            .aggregation(range)
            .await
            .with_context(|| format!("Failed to fetch the upstream aggregate for {range}"))?;
        raw.as_ref()
            .map(decode_aggregate)
            .transpose()
            .context("Malformed upstream aggregate")?
    } else {
        None
    };

    let report = HistoryReport::new(range, packets).with_server_stats(server);
    if json {
        println!("{}", report.render_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

async fn run_proxy(settings: &Settings) -> Result<()> {
    let server = ProxyServer::bind(settings.proxy_config()).await?;
    info!(addr = %server.local_addr()?, "Proxy listening");
    server.serve(ctrl_c()).await?;
    info!("Proxy stopped");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wd_advisory::AdvisoryClient;
use wd_domain::config::{Config, ConfigSeverity};
use wd_domain::event::EventSink;
use wd_domain::time::SystemClock;
use wd_gateway::api;
use wd_gateway::runtime::actuators::Actuators;
use wd_gateway::runtime::foreground::ConfiguredForeground;
use wd_gateway::runtime::supervisor;
use wd_gateway::state::AppState;
use wd_logbook::Logbook;
use wd_policy::{PolicyEngine, ToolRouter};

#[derive(Parser)]
#[command(name = "watchdeck", about = "Policy and execution-gating core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Config::from_env()).await
        }
        Some(Command::Version) => {
            println!("watchdeck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve path.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wd_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("watchdeck starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }
    let config = Arc::new(config);

    // ── Persistence ──────────────────────────────────────────────────
    let logbook = Arc::new(
        Logbook::open(&config.db_path)
            .with_context(|| format!("opening logbook at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "logbook ready");

    // ── Standing Orders + router ─────────────────────────────────────
    let policy = Arc::new(
        PolicyEngine::load(&config.standing_orders_path).with_context(|| {
            format!(
                "loading standing orders from {}",
                config.standing_orders_path.display()
            )
        })?,
    );
    let sink: Arc<dyn EventSink> = logbook.clone();
    let router = Arc::new(ToolRouter::new(policy.clone(), Some(sink)));
    tracing::info!(
        path = %config.standing_orders_path.display(),
        "standing orders loaded"
    );

    // ── Advisory client ──────────────────────────────────────────────
    let advisory = Arc::new(AdvisoryClient::new(&config.advisory));
    tracing::info!(mode = %config.advisory.mode, "advisory client ready");

    // ── Actuators + probes ───────────────────────────────────────────
    let dispatcher = Arc::new(Actuators::new(config.actuators.clone()));
    let foreground = Arc::new(ConfiguredForeground::new(config.foreground_process.clone()));
    tracing::info!(
        actuators_enabled = config.actuators.enable_actuators,
        keypress_enabled = config.actuators.enable_keypress,
        "actuator dispatcher ready"
    );

    let state = AppState {
        config: config.clone(),
        logbook,
        policy,
        router,
        advisory,
        dispatcher,
        foreground,
        clock: Arc::new(SystemClock),
    };

    // ── Watch-condition supervisor ───────────────────────────────────
    {
        let state = state.clone();
        tokio::spawn(async move {
            supervisor::run(state).await;
        });
    }
    tracing::info!(
        interval_sec = config.supervisor.interval_sec,
        "watch-condition supervisor started"
    );

    // ── HTTP surface ─────────────────────────────────────────────────
    let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    let app = api::router()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "watchdeck listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

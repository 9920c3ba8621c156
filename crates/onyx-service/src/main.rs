use clap::Parser;
use onyx_adapters::NarrativeExplainerConfig;
use onyx_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "onyxd", version, about = "Onyx KYB and trust signal service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8000
    #[arg(long, default_value = "127.0.0.1:8000", env = "ONYX_LISTEN")]
    listen: SocketAddr,
    /// YAML provider allowlist. Falls back to the built-in providers when unreadable.
    #[arg(
        long,
        default_value = "config/trust_registry.yaml",
        env = "TRUST_REGISTRY_CONFIG"
    )]
    trust_registry_config: PathBuf,
    /// Seed recorded on trust signals that do not carry their own.
    #[arg(long, default_value_t = 42, env = "ONYX_DETERMINISTIC_SEED")]
    deterministic_seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "onyx_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let narrative = NarrativeExplainerConfig::from_env();
    let status = narrative.configuration_status();
    info!(
        configured = status.configured,
        deployment = %status.deployment,
        version = %status.version,
        "Narrative explainer status"
    );

    let config = ServiceConfig {
        trust_registry_config: Some(cli.trust_registry_config),
        deterministic_seed: cli.deterministic_seed,
        narrative,
    };
    let state = ServiceState::bootstrap(config);
    info!(
        providers = state.registry.stats().total_providers,
        "Trust registry ready"
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("onyx-service REST listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

//! porthole - open authenticated local tunnels to platform-hosted services

mod display;
mod prompt;

use anyhow::{Context, Result};
use clap::Parser;
use porthole_core::{RelayConfig, TunnelOrchestrator};
use porthole_launcher::{build_plan, launch, ClientRegistry};
use porthole_platform::{HttpPlatformClient, PlatformClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Open an authenticated local tunnel to a platform-hosted service
#[derive(Parser, Debug)]
#[command(name = "porthole")]
#[command(version)]
struct Cli {
    /// Service instance to tunnel to
    service: String,

    /// Preferred local port; neighbors or an ephemeral port are used when taken
    #[arg(short, long, default_value_t = 10000)]
    port: u16,

    /// Local client to launch once the tunnel is up (e.g. psql)
    #[arg(long)]
    client: Option<String>,

    /// Platform API hostname
    #[arg(long, env = "PORTHOLE_TARGET")]
    target: String,

    /// Platform access token
    #[arg(long, env = "PORTHOLE_TOKEN")]
    token: String,

    /// Deployable relay payload uploaded when provisioning
    #[arg(long, env = "PORTHOLE_RELAY_PAYLOAD", default_value = "relay-app.zip")]
    relay_payload: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// The proxy task is quiet by default; PORTHOLE_TUNNEL_DEBUG raises its
/// verbosity independently of the main log level.
fn init_tracing(level: &str) {
    let proxy_level =
        std::env::var("PORTHOLE_TUNNEL_DEBUG").unwrap_or_else(|_| "error".to_string());
    let filter = EnvFilter::new(format!("{},porthole_relay::proxy={}", level, proxy_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let platform = Arc::new(
        HttpPlatformClient::new(&cli.target, &cli.token)
            .context("Failed to build platform client")?,
    );

    let services = platform
        .list_services()
        .await
        .context("Failed to list services")?;
    let service = services
        .into_iter()
        .find(|s| s.name == cli.service)
        .with_context(|| format!("Unknown service: {}", cli.service))?;

    let mut orchestrator =
        TunnelOrchestrator::new(platform, RelayConfig::new(&cli.relay_payload));

    info!("Opening tunnel to {} ({})", service.name, service.vendor);
    let (conn_info, local_port) = orchestrator.open(&service, cli.port).await?;
    orchestrator.wait_until_reachable().await?;

    println!("Tunnel open on localhost:{}", local_port);
    display::print_connection_info(&conn_info);

    if let Some(client_cmd) = cli.client.as_deref() {
        let registry = ClientRegistry::load().context("Failed to load client launchers")?;
        match registry.lookup(client_cmd) {
            Some(entry) => {
                let plan =
                    build_plan(entry, client_cmd, &conn_info, local_port, &prompt::StdinPrompter)?;
                let result = tokio::task::spawn_blocking(move || launch(&plan))
                    .await
                    .context("Launcher task panicked")?;
                if let Err(e) = result {
                    // the tunnel stays up even though the client never ran
                    warn!("{}", e);
                    wait_for_end(&mut orchestrator).await;
                }
            }
            None => {
                warn!("No launcher configured for {}", client_cmd);
                wait_for_end(&mut orchestrator).await;
            }
        }
    } else {
        println!("Press Ctrl-C to exit");
        wait_for_end(&mut orchestrator).await;
    }

    Ok(())
}

/// Block until the session ends or the user interrupts; dropping the
/// orchestrator afterwards aborts the proxy task.
async fn wait_for_end(orchestrator: &mut TunnelOrchestrator) {
    tokio::select! {
        _ = orchestrator.wait_until_ended() => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
}

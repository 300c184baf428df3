//! traefik-dns binary entry point.

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use traefik_dns::telemetry::Telemetry;
use traefik_dns::{Config, DnsServer};

/// DNS responder mirroring Traefik HTTP routers.
#[derive(Parser, Debug)]
#[command(name = "traefik-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "traefik-dns.toml")]
    config: PathBuf,
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("TRAEFIK_DNS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("dns.a")
                .with_list_parse_key("dns.fallthrough")
                .with_list_parse_key("dns.upstreams"),
        )
        .build()?
        .try_deserialize()?;

    let telemetry = Telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        api_url = %config.dns.api_url,
        "Starting traefik-dns"
    );

    // Fails here on invalid cname/a combinations before anything binds
    let server = match DnsServer::new(config.dns) {
        Ok(server) => server,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            telemetry.shutdown();
            return Err(e.into());
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let result = server.run(shutdown).await;

    telemetry.shutdown();

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("traefik-dns shutdown complete");
    Ok(())
}

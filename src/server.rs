//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::TraefikAuthority;
use crate::config::{DnsConfig, Settings};
use crate::error::DnsError;
use crate::forward::ForwardingAuthority;
use crate::hosts::TraefikRuleMatcher;
use crate::reconcile::Reconciler;
use crate::source::TraefikClient;
use crate::state::MappingStore;

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically emit state metrics.
async fn metrics_loop(store: MappingStore, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.emit_metrics();
                debug!(mappings = store.len(), ready = store.is_ready(), "emitted state metrics");
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Build the catalog: the Traefik authority first, then the forwarder if
/// upstreams are configured.
pub fn build_catalog(settings: Arc<Settings>, store: MappingStore) -> Result<Catalog, DnsError> {
    let origin = settings.zone.clone();
    let mut chain: Vec<Arc<dyn AuthorityObject>> = Vec::with_capacity(2);

    chain.push(Arc::new(TraefikAuthority::new(
        settings.clone(),
        store,
        settings.has_downstream(),
    )));

    if settings.has_downstream() {
        let forwarder = ForwardingAuthority::new(&settings.upstreams, origin.clone())?;
        chain.push(Arc::new(forwarder));
    }

    let mut catalog = Catalog::new();
    catalog.upsert(origin, chain);
    Ok(catalog)
}

/// DNS server mirroring Traefik routers.
pub struct DnsServer {
    settings: Arc<Settings>,
    store: MappingStore,
}

impl DnsServer {
    /// Create a new DNS server, validating the configuration.
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        Ok(Self {
            settings: Arc::new(config.settings()?),
            store: MappingStore::new(),
        })
    }

    /// Get a reference to the mapping store.
    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// Whether the first reconciliation pass has completed.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Log the effective configuration once.
    fn log_settings(&self) {
        let s = &self.settings;
        info!(
            routers_url = %s.routers_url,
            answer = %s.entry,
            ttl = s.entry.ttl(),
            refresh_interval_secs = s.refresh_interval.as_secs(),
            insecure_skip_verify = s.insecure_skip_verify,
            api_hostname = ?s.api_hostname,
            resolve_api_host = s.resolve_api_host,
            upstreams = ?s.upstreams,
            "Effective configuration"
        );
    }

    /// Run the DNS server until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.settings.listen_addr,
            zone = %self.settings.zone,
            "Starting traefik-dns server"
        );
        self.log_settings();

        let client = TraefikClient::new(&self.settings)?;
        let reconciler = Reconciler::new(
            Arc::new(client),
            Arc::new(TraefikRuleMatcher),
            self.store.clone(),
            self.settings.clone(),
        );

        let reconcile_shutdown = shutdown.clone();
        let reconcile_handle = tokio::spawn(async move {
            reconciler
                .run(async move { reconcile_shutdown.cancelled().await })
                .await;
        });

        // Wait for the first pass before serving
        info!("Waiting for first reconciliation pass...");
        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested before first pass completed");
                let _ = reconcile_handle.await;
                return Ok(());
            }

            if self.store.is_ready() {
                info!(mappings = self.store.len(), "First reconciliation pass complete");
                break;
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let catalog = build_catalog(self.settings.clone(), self.store.clone())?;

        let mut server = ServerFuture::new(catalog);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.settings.listen_addr).await?;
        info!(addr = %self.settings.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.settings.listen_addr).await?;
        info!(addr = %self.settings.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!(zone = %self.settings.zone, "DNS server ready to serve queries");

        let metrics_handle = tokio::spawn(metrics_loop(self.store.clone(), shutdown.clone()));
        self.store.emit_metrics();

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
                shutdown.cancel();
            }
        }

        let _ = metrics_handle.await;

        info!("Waiting for reconciler to stop...");
        let _ = reconcile_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}

//! Configuration types for traefik-dns.

use hickory_proto::rr::{LowerName, Name};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::{Host, Url};

use crate::error::DnsError;
use crate::responder::Fallthrough;
use crate::state::MappingEntry;

const DEFAULT_API_URL: &str = "https://traefik.example.com/api";
const DEFAULT_TTL: u32 = 30;
const DEFAULT_REFRESH_INTERVAL: u32 = 30;
const DEFAULT_REQUEST_TIMEOUT: u32 = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Zone this server is authoritative for. Defaults to the root zone.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Base URL of the Traefik API (e.g., "https://traefik.example.com/api").
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Answer every mapped host with a CNAME to this name.
    /// Mutually exclusive with `a`.
    #[serde(default)]
    pub cname: Option<String>,

    /// Answer every mapped host with these IPv4 addresses.
    /// Mutually exclusive with `cname`.
    #[serde(default)]
    pub a: Option<Vec<Ipv4Addr>>,

    /// TTL for DNS records in seconds. Zero keeps the default.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Seconds between reconciliation passes. Zero keeps the default.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u32,

    /// Per-request timeout for the Traefik API, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u32,

    /// Skip TLS certificate verification when talking to the Traefik API.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Answer queries for the API host itself from the `a` addresses.
    #[serde(default)]
    pub resolve_api_host: bool,

    /// Zones whose misses are passed to the downstream handler.
    /// An empty list matches every name.
    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,

    /// Upstream resolvers acting as the downstream handler.
    #[serde(default)]
    pub upstreams: Vec<SocketAddr>,

    /// Remove every mapping when the API returns no hosts at all.
    #[serde(default)]
    pub prune_on_empty: bool,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "traefik_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "traefik-dns".to_string()
}

fn default_zone() -> String {
    ".".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_refresh_interval() -> u32 {
    DEFAULT_REFRESH_INTERVAL
}

fn default_request_timeout() -> u32 {
    DEFAULT_REQUEST_TIMEOUT
}

/// Validated, immutable runtime settings derived from [`DnsConfig`].
///
/// Shared read-only by the reconciler and the responder; nothing in here
/// changes after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address for DNS server to listen on.
    pub listen_addr: SocketAddr,
    /// Zone the authority is registered under.
    pub zone: LowerName,
    /// Full `.../http/routers` endpoint.
    pub routers_url: Url,
    /// Answer template shared by every mapping entry.
    pub entry: Arc<MappingEntry>,
    /// Lower-cased CNAME target without trailing dot (CNAME mode only).
    pub cname_host: Option<String>,
    /// Delay between reconciliation passes.
    pub refresh_interval: Duration,
    /// Per-request timeout for the Traefik API.
    pub request_timeout: Duration,
    /// Disable TLS verification for the Traefik API.
    pub insecure_skip_verify: bool,
    /// Host name of the API, when it is a DNS name rather than an IP literal.
    pub api_hostname: Option<String>,
    /// Set when queries for `api_hostname` are answered directly.
    pub resolve_api_host: bool,
    /// Miss handling.
    pub fallthrough: Fallthrough,
    /// Upstream resolvers for the downstream handler.
    pub upstreams: Vec<SocketAddr>,
    /// See [`DnsConfig::prune_on_empty`].
    pub prune_on_empty: bool,
}

impl Settings {
    /// Host that should be answered without consulting the mapping store.
    pub fn direct_api_host(&self) -> Option<&str> {
        if self.resolve_api_host {
            self.api_hostname.as_deref()
        } else {
            None
        }
    }

    /// Whether a downstream handler is chained behind the responder.
    pub fn has_downstream(&self) -> bool {
        !self.upstreams.is_empty()
    }
}

impl DnsConfig {
    /// Validate this configuration and produce runtime [`Settings`].
    pub fn settings(&self) -> Result<Settings, DnsError> {
        let ttl = if self.ttl > 0 { self.ttl } else { DEFAULT_TTL };
        let refresh_interval = if self.refresh_interval > 0 {
            self.refresh_interval
        } else {
            DEFAULT_REFRESH_INTERVAL
        };

        let (entry, cname_host) = match (&self.cname, &self.a) {
            (Some(_), Some(_)) => {
                return Err(DnsError::Config(
                    "cname and a are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(DnsError::Config("one of cname or a is required".to_string()))
            }
            (Some(cname), None) => {
                let host = normalize_host(cname);
                if host.is_empty() {
                    return Err(DnsError::Config("cname must not be empty".to_string()));
                }
                let target = Name::from_ascii(format!("{host}."))?;
                (MappingEntry::Cname { target, ttl }, Some(host))
            }
            (None, Some(addresses)) => {
                if addresses.is_empty() {
                    return Err(DnsError::Config(
                        "a requires at least one IPv4 address".to_string(),
                    ));
                }
                // A record set holds each address once
                let mut unique = Vec::with_capacity(addresses.len());
                for addr in addresses {
                    if !unique.contains(addr) {
                        unique.push(*addr);
                    }
                }
                if unique.len() != addresses.len() {
                    warn!(
                        configured = addresses.len(),
                        unique = unique.len(),
                        "Dropping duplicate addresses from a"
                    );
                }
                let entry = MappingEntry::Address {
                    addresses: unique,
                    ttl,
                };
                (entry, None)
            }
        };

        if self.resolve_api_host && cname_host.is_some() {
            return Err(DnsError::Config(
                "resolve_api_host requires a to be configured".to_string(),
            ));
        }

        let api_url = Url::parse(&self.api_url)
            .map_err(|e| DnsError::InvalidAddress(format!("{}: {e}", self.api_url)))?;

        let api_hostname = match api_url.host() {
            Some(Host::Domain(domain)) => Some(normalize_host(domain)),
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => None,
            None => {
                return Err(DnsError::InvalidAddress(format!(
                    "API URL has no host: {api_url}"
                )))
            }
        };

        let zone = LowerName::from(Name::from_ascii(&self.zone)?);

        let fallthrough = match &self.fallthrough {
            None => Fallthrough::Disabled,
            Some(zones) => Fallthrough::from_zones(zones)?,
        };

        Ok(Settings {
            listen_addr: self.listen_addr,
            zone,
            routers_url: routers_url(&api_url)?,
            entry: Arc::new(entry),
            cname_host,
            refresh_interval: Duration::from_secs(u64::from(refresh_interval)),
            request_timeout: Duration::from_secs(u64::from(self.request_timeout.max(1))),
            insecure_skip_verify: self.insecure_skip_verify,
            api_hostname,
            resolve_api_host: self.resolve_api_host,
            fallthrough,
            upstreams: self.upstreams.clone(),
            prune_on_empty: self.prune_on_empty,
        })
    }
}

/// Append `http/routers` to the API base URL.
fn routers_url(base: &Url) -> Result<Url, DnsError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DnsError::InvalidAddress(format!("API URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(["http", "routers"]);
    Ok(url)
}

/// Lower-case a host name and strip its trailing root label.
pub(crate) fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

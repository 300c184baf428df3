//! Traefik DNS - A DNS responder that mirrors Traefik HTTP routers.
//!
//! This crate polls the Traefik API for its HTTP routers, extracts the
//! host names from their `Host(...)` / `HostSNI(...)` rules, and answers
//! `A` queries for those names with either a fixed CNAME or a fixed list of
//! IPv4 addresses. Queries never touch the Traefik API; they are answered
//! from an in-memory mapping that a background reconciler keeps current.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          traefik-dns                           │
//! │                                                                │
//! │  ┌───────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │ TraefikClient │──▶│  Reconciler  │──▶│  MappingStore    │   │
//! │  │ GET /routers  │   │ extract+diff │   │  (RwLock, ready) │   │
//! │  └───────────────┘   └──────────────┘   └────────┬─────────┘   │
//! │                                                  │ read        │
//! │                                                  ▼             │
//! │  ┌──────────────────┐    Skip     ┌──────────────────────┐     │
//! │  │ ForwardingAuth.  │◀────────────│  TraefikAuthority    │◀─ UDP/TCP
//! │  │ (upstreams)      │             │  (QueryResponder)    │     │
//! │  └──────────────────┘             └──────────────────────┘     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use traefik_dns::{DnsConfig, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: DnsConfig = serde_json::from_value(serde_json::json!({
//!         "listen_addr": "[::]:5353",
//!         "api_url": "http://traefik:8080/api",
//!         "cname": "traefik.example.com",
//!     }))
//!     .unwrap();
//!
//!     let server = DnsServer::new(config).unwrap();
//!     server.run(CancellationToken::new()).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod forward;
pub mod hosts;
pub mod metrics;
pub mod reconcile;
pub mod responder;
pub mod router;
pub mod server;
pub mod source;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use authority::TraefikAuthority;
pub use config::{Config, DnsConfig, Settings, TelemetryConfig};
pub use error::{DnsError, FetchError};
pub use reconcile::Reconciler;
pub use responder::{QueryResponder, Response};
pub use server::DnsServer;
pub use state::{MappingEntry, MappingStore};

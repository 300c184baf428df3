//! Traefik HTTP router representation, as returned by `GET /api/http/routers`.

use serde::{Deserialize, Serialize};

/// A TLS domain block on a router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouterTlsDomain {
    /// Main domain.
    #[serde(default)]
    pub main: String,
    /// Subject alternative names.
    #[serde(default)]
    pub sans: Vec<String>,
}

/// TLS configuration on a router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouterTls {
    /// Name of the TLS options set.
    #[serde(default)]
    pub options: String,
    /// Domains covered by the certificate.
    #[serde(default)]
    pub domains: Vec<HttpRouterTlsDomain>,
}

/// One Traefik HTTP router. Only `rule` drives DNS answers; the rest is
/// carried for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouter {
    /// Entry points the router listens on.
    #[serde(default)]
    pub entry_points: Vec<String>,
    /// Target service.
    #[serde(default)]
    pub service: String,
    /// Match expression, e.g. ``Host(`app.example.com`)``.
    #[serde(default)]
    pub rule: String,
    /// Router priority.
    #[serde(default)]
    pub priority: i64,
    /// TLS configuration, if the router terminates TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<HttpRouterTls>,
    /// Router status (enabled, disabled, warning).
    #[serde(default)]
    pub status: String,
    /// Entry points actually in use.
    #[serde(default)]
    pub using: Vec<String>,
    /// Router name, e.g. `whoami@docker`.
    #[serde(default)]
    pub name: String,
    /// Provider that declared the router.
    #[serde(default)]
    pub provider: String,
}

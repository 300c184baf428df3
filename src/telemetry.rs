//! Logging and metrics exporter setup for the binary.
//!
//! Components only emit through `tracing` and `metrics` macros; this module
//! decides where those go. Optional sinks:
//! - Prometheus scrape endpoint (`prometheus` feature)
//! - OTLP span export (`otel` feature)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handle to the installed telemetry. Call [`Telemetry::shutdown`] before
/// exiting so buffered spans are flushed.
#[must_use = "dropping the handle skips the final span flush"]
pub struct Telemetry {
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Telemetry {
    /// Install the global subscriber and any configured exporters.
    pub fn init(config: &TelemetryConfig) -> Result<Self, BoxError> {
        let env_filter =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

        #[cfg(feature = "otel")]
        let (otel_layer, tracer_provider) = match &config.opentelemetry {
            Some(otel) => {
                let (layer, provider) = otel::layer(otel)?;
                (Some(layer), Some(provider))
            }
            None => (None, None),
        };

        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer());

        #[cfg(feature = "otel")]
        registry.with(otel_layer).try_init()?;
        #[cfg(not(feature = "otel"))]
        registry.try_init()?;

        if let Some(otel) = &config.opentelemetry {
            if cfg!(feature = "otel") {
                tracing::info!(endpoint = %otel.endpoint, "OpenTelemetry tracing enabled");
            } else {
                tracing::warn!("opentelemetry configured but the `otel` feature is disabled");
            }
        }

        #[cfg(feature = "prometheus")]
        if let Some(addr) = config.prometheus_addr {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;
            tracing::info!(%addr, "Prometheus metrics exporter started");
        }
        #[cfg(not(feature = "prometheus"))]
        if let Some(addr) = config.prometheus_addr {
            tracing::warn!(%addr, "prometheus_addr set but the `prometheus` feature is disabled");
        }

        Ok(Self {
            #[cfg(feature = "otel")]
            tracer_provider,
        })
    }

    /// Flush and stop exporters.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
    use opentelemetry_sdk::Resource;
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
    use tracing_opentelemetry::OpenTelemetryLayer;

    use super::BoxError;
    use crate::config::OpenTelemetryConfig;

    pub(super) fn layer<S>(
        config: &OpenTelemetryConfig,
    ) -> Result<(OpenTelemetryLayer<S, SdkTracer>, SdkTracerProvider), BoxError>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .build()?;

        let resource = Resource::builder()
            .with_attributes([
                KeyValue::new(SERVICE_NAME, config.service_name.clone()),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            ])
            .build();

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();

        let tracer = provider.tracer("traefik-dns");

        Ok((tracing_opentelemetry::layer().with_tracer(tracer), provider))
    }
}

//! Prometheus metrics.
//!
//! Every service records through the `metrics` facade. Without an installed
//! recorder those calls are no-ops; [`install_prometheus`] installs one.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::MetricsSettings;
use crate::{Error, Result};

/// Default port of the HTTP listener.
const DEFAULT_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides
    /// (`CARDSMITH_METRICS_ENABLED`, `CARDSMITH_METRICS_PORT`).
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::resolve(settings, |key| std::env::var(key).ok())
    }

    pub(crate) fn resolve(
        settings: Option<&MetricsSettings>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut enabled = settings.and_then(|s| s.enabled).unwrap_or(false);
        let mut port = settings.and_then(|s| s.port).unwrap_or(DEFAULT_PORT);

        if let Some(value) = var("CARDSMITH_METRICS_ENABLED") {
            let value = value.to_lowercase();
            enabled = value == "true" || value == "1" || value == "yes";
        }
        if let Some(p) = var("CARDSMITH_METRICS_PORT").and_then(|v| v.parse::<u16>().ok()) {
            port = p;
        }

        Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

/// Installed metrics recorder.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: Option<PrometheusHandle>,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text format.
    ///
    /// Returns `None` when the recorder serves an HTTP listener instead.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.prometheus.as_ref().map(PrometheusHandle::render)
    }
}

/// Installs the Prometheus recorder, with an HTTP listener when `expose`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be started.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if expose {
        builder
            .with_http_listener(config.listen_addr)
            .install()
            .map_err(|e| Error::operation("metrics_listener_install", e))?;
        tracing::info!(addr = %config.listen_addr, "Serving Prometheus metrics");
        None
    } else {
        Some(
            builder
                .install_recorder()
                .map_err(|e| Error::operation("metrics_recorder_install", e))?,
        )
    };

    Ok(Some(MetricsHandle { prometheus }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_smoke() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("cardsmith_cache_resolutions_total", "tier" => "l1").increment(1);
        });
        let rendered = handle.render();
        assert!(rendered.contains("cardsmith_cache_resolutions_total"));
    }

    #[test]
    fn test_env_overrides() {
        let settings = MetricsSettings {
            enabled: Some(false),
            port: Some(9200),
        };
        let config = MetricsConfig::resolve(Some(&settings), |_| None);
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), 9200);

        let config = MetricsConfig::resolve(Some(&settings), |key| match key {
            "CARDSMITH_METRICS_ENABLED" => Some("yes".to_string()),
            "CARDSMITH_METRICS_PORT" => Some("9300".to_string()),
            _ => None,
        });
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9300);
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let handle = install_prometheus(&MetricsConfig::default(), false).unwrap();
        assert!(handle.is_none());
    }
}

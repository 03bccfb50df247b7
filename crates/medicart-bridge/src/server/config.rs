//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use medicart_core::Config;

/// Settings the HTTP/WebSocket server needs at request time.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address.
    pub addr: SocketAddr,

    /// Camera tool executable name or path.
    pub camera_cli: String,

    /// Collector URL used when a forward request does not name one.
    pub forward_url: Option<String>,

    /// Patient used when a forward request does not name one.
    pub patient_name: Option<String>,

    /// Clinic used when a forward request does not name one.
    pub clinic_name: Option<String>,

    /// Per-request timeout for HTTP forwarding.
    pub forward_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerConfig {
    /// Derive server settings from the resolved configuration, binding on
    /// all interfaces at the configured port.
    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], config.server.port)),
            camera_cli: config.tools.camera_cli.clone(),
            forward_url: config.forward.url.clone(),
            patient_name: config.forward.patient_name.clone(),
            clinic_name: config.forward.clinic_name.clone(),
            forward_timeout: Duration::from_secs(config.forward.timeout_secs),
        }
    }

    /// Set the bind address.
    #[must_use]
    pub const fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_from_core_config() {
        let mut config = Config::default();
        config.server.port = 9100;
        config.tools.camera_cli = "/opt/cam/camera_cli".into();
        config.forward.timeout_secs = 3;

        let server = ServerConfig::from_config(&config);
        assert_eq!(server.addr.port(), 9100);
        assert_eq!(server.camera_cli, "/opt/cam/camera_cli");
        assert_eq!(server.forward_timeout, Duration::from_secs(3));
        assert_eq!(
            server.forward_url.as_deref(),
            Some("http://localhost:8080/api/data")
        );
    }
}

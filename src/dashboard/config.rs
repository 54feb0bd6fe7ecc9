//! Dashboard Configuration
//!
//! The dashboard has no authentication, so it binds to localhost by default.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Dashboard server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Bind address (default: 127.0.0.1)
    pub bind_addr: IpAddr,
    /// Port number (default: 5000)
    pub port: u16,
    /// Enable CORS (restricted to the listed origins)
    pub cors_enabled: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
    /// Enable request logging
    pub log_requests: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            cors_enabled: true,
            cors_origins: localhost_origins(5000),
            log_requests: true,
        }
    }
}

fn localhost_origins(port: u16) -> Vec<String> {
    vec![
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
}

impl DashboardConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DASHBOARD_BIND_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(_) => tracing::warn!("Ignoring invalid DASHBOARD_BIND_ADDR: {}", addr),
            }
        }

        if let Ok(port) = std::env::var("DASHBOARD_PORT") {
            match port.parse() {
                Ok(parsed) => {
                    config.port = parsed;
                    config.cors_origins = localhost_origins(parsed);
                }
                Err(_) => tracing::warn!("Ignoring invalid DASHBOARD_PORT: {}", port),
            }
        }

        if let Ok(val) = std::env::var("DASHBOARD_LOG_REQUESTS") {
            config.log_requests = val == "true" || val == "1";
        }

        if !config.is_localhost() {
            tracing::warn!(
                "Dashboard binding to {} - it has no authentication",
                config.bind_addr
            );
        }

        config
    }

    /// Check if bound to localhost only
    pub fn is_localhost(&self) -> bool {
        self.bind_addr.is_loopback()
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.bind_addr, self.port)
    }
}

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Exposure of the dual writer and watch collectors on `/metrics`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    /// Interface the metrics endpoint listens on
    #[serde(default = "default_prometheus_bind")]
    pub prometheus_bind: IpAddr,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_bind: default_prometheus_bind(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn prometheus_addr(&self) -> SocketAddr {
        SocketAddr::new(self.prometheus_bind, self.prometheus_port)
    }

    /// # Errors
    /// `Error::InvalidConfig` when the endpoint is enabled on port 0, on a
    /// privileged port, or on an address no listener can bind (multicast).
    pub fn validate(&self) -> Result<()> {
        if !self.prometheus_enabled {
            if self.prometheus_port != default_prometheus_port() || self.prometheus_bind != default_prometheus_bind() {
                warn!(
                    addr = %self.prometheus_addr(),
                    "metrics endpoint configured but monitoring is disabled"
                );
            }
            return Ok(());
        }

        if self.prometheus_port == 0 {
            return Err(Error::InvalidConfig("prometheus_port cannot be 0 when enabled".into()));
        }
        if self.prometheus_port < 1024 {
            return Err(Error::InvalidConfig(format!(
                "prometheus_port {} is a privileged port (requires root)",
                self.prometheus_port
            )));
        }
        if self.prometheus_bind.is_multicast() {
            return Err(Error::InvalidConfig(format!(
                "prometheus_bind {} is a multicast address",
                self.prometheus_bind
            )));
        }

        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    false
}

fn default_prometheus_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_prometheus_port() -> u16 {
    8080
}

//! Find the web interface of a freshly flashed device.

use std::{fmt, net::IpAddr, time::Duration};

use url::Url;

use crate::FlasherConfig;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Address the device answered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    Hostname(Url),
    Fallback(Url),
}

impl DeviceAddress {
    pub const fn url(&self) -> &Url {
        match self {
            Self::Hostname(x) | Self::Fallback(x) => x,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.url().fmt(f)
    }
}

/// Tries the announced hostname first and falls back to the access point address.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    hostname: String,
    fallback_ip: IpAddr,
    timeout: Duration,
}

impl DeviceLocator {
    pub fn new(hostname: impl Into<String>, fallback_ip: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            fallback_ip,
            timeout: LOOKUP_TIMEOUT,
        }
    }

    pub fn from_config(config: &FlasherConfig) -> Self {
        Self::new(config.device_hostname.clone(), config.device_fallback_ip)
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `None` if the configured hostname is not a valid host.
    pub fn hostname_url(&self) -> Option<Url> {
        Url::parse(&format!("http://{}/", self.hostname)).ok()
    }

    pub fn fallback_url(&self) -> Url {
        let host = match self.fallback_ip {
            IpAddr::V4(x) => x.to_string(),
            IpAddr::V6(x) => format!("[{x}]"),
        };
        Url::parse(&format!("http://{host}/")).expect("IP address is a valid host")
    }

    /// Resolve the hostname within the timeout, otherwise use the fallback address.
    pub async fn locate(&self) -> DeviceAddress {
        if let Some(url) = self.hostname_url() {
            let lookup = tokio::net::lookup_host((self.hostname.as_str(), 80));

            match tokio::time::timeout(self.timeout, lookup).await {
                Ok(Ok(mut addrs)) => {
                    if addrs.next().is_some() {
                        tracing::info!("{} resolved", self.hostname);
                        return DeviceAddress::Hostname(url);
                    }
                    tracing::info!("{} has no addresses", self.hostname);
                }
                Ok(Err(e)) => tracing::info!("Failed to resolve {}: {e}", self.hostname),
                Err(_) => tracing::info!("Timed out resolving {}", self.hostname),
            }
        }

        DeviceAddress::Fallback(self.fallback_url())
    }
}

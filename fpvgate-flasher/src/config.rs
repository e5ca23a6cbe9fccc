//! Endpoints and defaults used by the orchestrator.

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

const RELEASE_ARCHIVE_URL: &str = "https://github.com/LouisHitchcock/FPVGate/releases/download";

/// Every field has a default, so a config file only needs to list what it overrides.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlasherConfig {
    /// Board catalog (`boards.json`)
    pub boards_url: Url,
    /// Release catalog (GitHub releases API)
    pub releases_url: Url,
    /// Release download root of the constructed `{base}/{version}/{file}` asset path
    pub asset_base_url: Url,
    /// Firmware directory hosted next to the web flasher, same path layout
    pub local_firmware_url: Option<Url>,
    /// Optional CDN mirror using the same path layout
    pub cdn_mirror_url: Option<Url>,
    pub product_name: String,
    /// Hostname the flashed device announces
    pub device_hostname: String,
    /// Address of the device access point
    pub device_fallback_ip: IpAddr,
    pub connect_timeout_secs: u64,
}

impl Default for FlasherConfig {
    fn default() -> Self {
        Self {
            boards_url: Url::parse(fpvgate_config::BOARDS_URL).expect("valid constant URL"),
            releases_url: Url::parse(fpvgate_config::RELEASES_URL).expect("valid constant URL"),
            asset_base_url: Url::parse(RELEASE_ARCHIVE_URL).expect("valid constant URL"),
            local_firmware_url: None,
            cdn_mirror_url: None,
            product_name: "FPVGate".to_string(),
            device_hostname: "fpvgate.local".to_string(),
            device_fallback_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)),
            connect_timeout_secs: 10,
        }
    }
}

impl FlasherConfig {
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config() {
        let config = FlasherConfig::from_json(
            br#"{ "product_name": "Gate", "cdn_mirror_url": "https://cdn.example.com/fw" }"#,
        )
        .unwrap();

        assert_eq!(config.product_name, "Gate");
        assert_eq!(
            config.cdn_mirror_url.as_ref().unwrap().as_str(),
            "https://cdn.example.com/fw"
        );
        assert_eq!(config.boards_url, FlasherConfig::default().boards_url);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}

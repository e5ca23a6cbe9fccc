//! Firmware releases as published through the GitHub releases API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};
use url::Url;

use crate::Result;

/// A downloadable file attached to a release.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub file_name: String,
    pub download_url: Url,
}

/// A published firmware release.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub tag: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_prerelease: bool,
    pub is_draft: bool,
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    /// Only non-draft releases with at least one asset can be flashed.
    pub fn is_eligible(&self) -> bool {
        !self.is_draft && !self.assets.is_empty()
    }

    /// Find an asset by exact file name.
    pub fn asset(&self, file_name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|x| x.file_name == file_name)
    }

    /// Label shown in the version selector.
    pub fn label(&self, is_latest: bool) -> String {
        let mut label = self.tag.clone();
        if self.is_prerelease {
            label.push_str(" (Pre-release)");
        }
        if is_latest {
            label.push_str(" (Latest)");
        }
        label
    }

    /// Short description of the release date.
    pub fn info(&self) -> String {
        let date = self
            .published_at
            .map(|x| x.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if self.is_prerelease {
            format!("Released: {date} (Pre-release)")
        } else {
            format!("Released: {date}")
        }
    }
}

/// The first stable release, or the first release overall if none are stable.
pub fn latest_stable(releases: &[ReleaseDescriptor]) -> Option<&ReleaseDescriptor> {
    releases
        .iter()
        .find(|x| !x.is_prerelease)
        .or_else(|| releases.first())
}

/// Raw response of the releases API. Entries which fail to parse are skipped.
#[serde_as]
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ReleaseListJson(#[serde_as(as = "VecSkipError<_>")] pub Vec<ReleaseJson>);

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseJson {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub assets: Vec<AssetJson>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AssetJson {
    pub name: String,
    pub browser_download_url: Url,
}

impl ReleaseListJson {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(Into::into)
    }

    /// Eligible releases in remote order (newest first).
    pub fn into_releases(self) -> Vec<ReleaseDescriptor> {
        self.0
            .into_iter()
            .map(ReleaseDescriptor::from)
            .filter(ReleaseDescriptor::is_eligible)
            .collect()
    }
}

impl From<ReleaseJson> for ReleaseDescriptor {
    fn from(value: ReleaseJson) -> Self {
        Self {
            tag: value.tag_name,
            published_at: value.published_at,
            is_prerelease: value.prerelease,
            is_draft: value.draft,
            assets: value
                .assets
                .into_iter()
                .map(|x| ReleaseAsset {
                    file_name: x.name,
                    download_url: x.browser_download_url,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASES: &[u8] = br#"[
        {
            "tag_name": "v1.3.0-beta",
            "draft": false,
            "prerelease": true,
            "published_at": "2025-03-01T10:00:00Z",
            "assets": [
                { "name": "ESP32S3-8MB-firmware.bin", "browser_download_url": "https://example.com/b/ESP32S3-8MB-firmware.bin" }
            ]
        },
        {
            "tag_name": "v1.2.1",
            "draft": true,
            "prerelease": false,
            "published_at": null,
            "assets": [
                { "name": "ESP32S3-8MB-firmware.bin", "browser_download_url": "https://example.com/d/ESP32S3-8MB-firmware.bin" }
            ]
        },
        {
            "tag_name": "v1.2.0",
            "draft": false,
            "prerelease": false,
            "published_at": "2025-02-01T10:00:00Z",
            "assets": [
                { "name": "ESP32S3-8MB-firmware.bin", "browser_download_url": "https://example.com/a/ESP32S3-8MB-firmware.bin" },
                { "name": "broken.bin", "browser_download_url": "not a url" }
            ]
        },
        {
            "tag_name": "v1.1.0",
            "draft": false,
            "prerelease": false,
            "published_at": "2025-01-01T10:00:00Z",
            "assets": []
        },
        { "draft": false }
    ]"#;

    #[test]
    fn drafts_and_assetless_are_dropped() {
        let releases = ReleaseListJson::from_json(RELEASES).unwrap().into_releases();
        let tags: Vec<&str> = releases.iter().map(|x| x.tag.as_str()).collect();

        assert_eq!(tags, ["v1.3.0-beta", "v1.2.0"]);
        assert_eq!(releases[1].assets.len(), 1);
        assert!(releases[1].asset("ESP32S3-8MB-firmware.bin").is_some());
        assert!(releases[1].asset("ESP32S3-8MB-littlefs.bin").is_none());
    }

    #[test]
    fn latest_stable_prefers_non_prerelease() {
        let releases = ReleaseListJson::from_json(RELEASES).unwrap().into_releases();
        assert_eq!(latest_stable(&releases).unwrap().tag, "v1.2.0");

        let only_pre = &releases[..1];
        assert_eq!(latest_stable(only_pre).unwrap().tag, "v1.3.0-beta");

        assert!(latest_stable(&[]).is_none());
    }

    #[test]
    fn labels() {
        let releases = ReleaseListJson::from_json(RELEASES).unwrap().into_releases();

        assert_eq!(releases[0].label(true), "v1.3.0-beta (Pre-release) (Latest)");
        assert_eq!(releases[1].label(false), "v1.2.0");
        assert_eq!(releases[1].info(), "Released: 2025-02-01");
        assert_eq!(releases[0].info(), "Released: 2025-03-01 (Pre-release)");
    }
}

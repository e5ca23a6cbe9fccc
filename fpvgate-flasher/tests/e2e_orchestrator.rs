//! Catalog loading, selection and manifest preparation.


use e2e_common::{PREFIX, asset_url, config, fetcher};
use fpvgate_config::{ChipFamily, VisibilityTier};
use fpvgate_downloader::MemoryFetcher;
use fpvgate_flasher::{
    Catalog, CustomRole, Error, Orchestrator, ReleaseListing, ResolutionStrategy,
    resolver::SegmentSource,
};

#[tokio::test]
async fn eight_mb_board_with_release_assets() {
    let mut orch = Orchestrator::new(config(), fetcher());
    orch.initialize().await.unwrap();

    assert!(!orch.boards().is_fallback());
    assert_eq!(orch.selection().release_tag(), Some("v1.2.0"));

    orch.selection_mut().select_board("esp32s3").unwrap();
    assert!(orch.selection().is_ready());

    let manifest = orch.prepare_manifest().unwrap();

    assert_eq!(manifest.version(), "v1.2.0");
    assert_eq!(manifest.display_name(), "FPVGate v1.2.0");
    assert_eq!(manifest.chip_family(), ChipFamily::Esp32S3);

    let offsets: Vec<_> = manifest.segments().iter().map(|x| x.offset).collect();
    assert_eq!(offsets, [0x0, 0x8000, 0x10000, 0x410000]);

    for x in manifest.segments() {
        assert_eq!(x.strategy, ResolutionStrategy::OriginRelease);
        assert_eq!(x.source, SegmentSource::Remote(asset_url("v1.2.0", &x.role)));
    }

    let wire: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
    assert_eq!(wire["version"], "v1.2.0");
    assert_eq!(wire["chipFamily"], "ESP32-S3");
    assert_eq!(wire["builds"][0]["parts"].as_array().unwrap().len(), 4);
    assert_eq!(wire["builds"][0]["parts"][3]["offset"], 0x410000);
}

#[tokio::test]
async fn release_catalog_failure() {
    let config = config();
    let fetcher = fetcher().with_status(config.releases_url.clone(), 500);
    let mut orch = Orchestrator::new(config, fetcher);

    let err = orch.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        Error::CatalogUnavailable {
            catalog: Catalog::Releases,
            ..
        }
    ));
    assert_eq!(
        err.user_message(),
        "Failed to load firmware versions. Please try again later."
    );

    assert!(matches!(orch.listing(), ReleaseListing::Failed));
    let options = orch.release_options();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].label, "Failed to load versions");
    assert_eq!(options[0].tag, None);

    orch.selection_mut().select_board("esp32s3").unwrap();
    assert!(!orch.selection().is_ready());
    assert!(!*orch.selection().subscribe_ready().borrow());
    assert!(matches!(orch.prepare_manifest(), Err(Error::NotReady)));
}

#[tokio::test]
async fn board_catalog_failure_uses_builtin_boards() {
    let config = config();
    let fetcher = fetcher().with_status(config.boards_url.clone(), 404);
    let mut orch = Orchestrator::new(config, fetcher);

    orch.initialize().await.unwrap();

    assert!(orch.boards().is_fallback());
    let ids: Vec<_> = orch.board_options().iter().map(|x| x.id()).collect();
    assert_eq!(ids, ["esp32s3", "esp32s3supermini"]);
}

#[tokio::test]
async fn loads_are_idempotent() {
    let fetcher = fetcher();
    let mut orch = Orchestrator::new(config(), fetcher.clone());

    orch.initialize().await.unwrap();
    let boards = orch.boards().boards().to_vec();
    let releases = orch.releases().releases().to_vec();
    assert_eq!(fetcher.requests(), 2);

    orch.initialize().await.unwrap();
    assert_eq!(orch.boards().boards(), boards);
    assert_eq!(orch.releases().releases(), releases);
    assert_eq!(fetcher.requests(), 2);
}

#[tokio::test]
async fn release_options() {
    let mut orch = Orchestrator::new(config(), fetcher());
    orch.initialize().await.unwrap();

    let options = orch.release_options();
    let labels: Vec<_> = options.iter().map(|x| x.label.as_str()).collect();

    assert_eq!(labels, ["v1.3.0-beta (Pre-release) (Latest)", "v1.2.0"]);
    assert_eq!(
        options[1].info.as_deref(),
        Some("Released: 2025-02-01")
    );
}

#[tokio::test]
async fn expert_board_cleared_in_standard_mode() {
    let mut orch = Orchestrator::new(config(), fetcher());
    orch.initialize().await.unwrap();

    assert_eq!(orch.board_options().len(), 1);

    let selection = orch.selection_mut();
    selection.set_visibility_tier(VisibilityTier::Expert);
    selection.select_board("esp32c3").unwrap();
    assert!(selection.is_ready());

    selection.set_visibility_tier(VisibilityTier::Standard);
    assert_eq!(selection.board_id(), None);
    assert!(!selection.is_ready());
    assert!(matches!(orch.prepare_manifest(), Err(Error::NotReady)));
}

#[tokio::test]
async fn firmware_upload_wins() {
    let mut orch = Orchestrator::new(config(), fetcher());
    orch.initialize().await.unwrap();

    let selection = orch.selection_mut();
    selection.select_board("esp32s3").unwrap();
    selection.set_custom_binary(CustomRole::Firmware, "custom.bin", vec![0xE9, 0x01]);

    let manifest = orch.prepare_manifest().unwrap();
    let firmware = &manifest.segments()[2];

    assert_eq!(firmware.role, "firmware");
    assert_eq!(firmware.strategy, ResolutionStrategy::UserUpload);
    assert_eq!(
        manifest.to_wire().builds[0].parts[2].path,
        "blob:firmware/custom.bin"
    );
    assert_eq!(
        manifest.segments()[3].strategy,
        ResolutionStrategy::OriginRelease
    );

    orch.selection_mut()
        .clear_custom_binary(CustomRole::Firmware);
    let manifest = orch.prepare_manifest().unwrap();
    assert_eq!(
        manifest.segments()[2].strategy,
        ResolutionStrategy::OriginRelease
    );
}

#[tokio::test]
async fn missing_assets_use_archive_path() {
    let config = config();
    let releases = format!(
        r#"[{{ "tag_name": "v1.2.0", "assets": [
            {{ "name": "{PREFIX}-firmware.bin", "browser_download_url": "{}" }}
        ] }}]"#,
        asset_url("v1.2.0", "firmware")
    );
    let fetcher = MemoryFetcher::new()
        .with_body(config.boards_url.clone(), e2e_common::BOARDS)
        .with_body(config.releases_url.clone(), releases);
    let mut orch = Orchestrator::new(config, fetcher);

    orch.initialize().await.unwrap();
    orch.selection_mut().select_board("esp32s3").unwrap();

    let res = orch.resolve().unwrap();
    assert!(res.missing.is_empty());
    assert_eq!(res.resolved.len(), 4);
    assert_eq!(res.resolved[0].strategy, ResolutionStrategy::OriginRelease);
    assert_eq!(
        res.resolved[0].source,
        SegmentSource::Remote(
            url::Url::parse("https://fw.example.com/releases/v1.2.0/ESP32S3-8MB-bootloader.bin")
                .unwrap()
        )
    );
    assert_eq!(res.resolved[2].strategy, ResolutionStrategy::OriginRelease);
}

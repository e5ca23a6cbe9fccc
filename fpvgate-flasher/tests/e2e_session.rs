//! Flashing sessions driven through the orchestrator.


use e2e_common::{
    MockDriver, ROLES, asset_body, completions, config, drain, errors, fetcher, logs_starting_with,
    visited,
};
use fpvgate_flasher::{
    CustomRole, Error, FileDriver, FlashController, FlashDriver, FlashError, FlashEvent,
    FlashState, Orchestrator,
};
use fpvgate_downloader::MemoryFetcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn orchestrator() -> Orchestrator<MemoryFetcher> {
    let mut orch = Orchestrator::new(config(), fetcher());
    orch.initialize().await.unwrap();
    orch.selection_mut().select_board("esp32s3").unwrap();
    orch
}

#[tokio::test]
async fn verify_without_erase() {
    let orch = orchestrator().await;
    let driver = MockDriver::default();
    let controller = FlashController::new(driver.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    assert!(!orch.flash_options().erase_before_flash);
    assert!(orch.flash_options().verify_after_flash);

    orch.flash(&controller, Some(tx), CancellationToken::new())
        .await
        .unwrap();

    let events = drain(rx);
    assert_eq!(
        visited(&events),
        [
            FlashState::Connecting,
            FlashState::WritingSegments,
            FlashState::Verifying,
            FlashState::Completed
        ]
    );
    assert_eq!(completions(&events), 1);
    assert_eq!(errors(&events), 0);
    assert!(matches!(events.last(), Some(FlashEvent::Complete)));

    let calls = driver.calls();
    assert!(!calls.contains(&"erase".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("disconnect"));

    for (role, offset) in ROLES.into_iter().zip([0x0, 0x8000, 0x10000, 0x410000]) {
        assert_eq!(driver.written(offset), Some(asset_body("v1.2.0", role)));
    }

    assert!(events.iter().any(|x| matches!(
        x,
        FlashEvent::Log(line) if line.message.starts_with("Writing firmware at 0x10000")
    )));
}

#[tokio::test]
async fn second_segment_write_fails() {
    let mut orch = orchestrator().await;
    orch.selection_mut().set_erase_before_flash(true);

    let driver = MockDriver::failing_write(2);
    let controller = FlashController::new(driver.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    let err = orch
        .flash(&controller, Some(tx), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Flash(FlashError::WriteError { segment: 2, .. })
    ));
    assert!(err.user_message().contains("retry flashing from the beginning"));

    assert_eq!(
        driver.calls(),
        [
            "connect ESP32-S3",
            "erase",
            "write 0x0",
            "write 0x8000",
            "disconnect"
        ]
    );

    let events = drain(rx);
    assert_eq!(errors(&events), 1);
    assert_eq!(completions(&events), 0);
    assert!(matches!(
        events.last(),
        Some(FlashEvent::Error(FlashError::WriteError { segment: 2, .. }))
    ));
    assert_eq!(
        visited(&events),
        [
            FlashState::Connecting,
            FlashState::Erasing,
            FlashState::WritingSegments,
            FlashState::Failed
        ]
    );
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn erase_failure_survives_failed_disconnect() {
    let mut orch = orchestrator().await;
    orch.selection_mut().set_erase_before_flash(true);

    let driver = MockDriver::default()
        .with_failing_erase()
        .with_failing_disconnect();
    let controller = FlashController::new(driver.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    let err = orch
        .flash(&controller, Some(tx), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Flash(FlashError::EraseError { .. })));
    assert!(err.user_message().contains("retry flashing from the beginning"));
    assert_eq!(driver.calls(), ["connect ESP32-S3", "erase", "disconnect"]);

    let events = drain(rx);
    assert_eq!(errors(&events), 1);
    assert_eq!(completions(&events), 0);
    assert_eq!(logs_starting_with(&events, "Disconnect failed"), 1);
    assert!(matches!(
        events.last(),
        Some(FlashEvent::Error(FlashError::EraseError { .. }))
    ));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn failed_disconnect_after_success_still_completes() {
    let orch = orchestrator().await;
    let driver = MockDriver::default().with_failing_disconnect();
    let controller = FlashController::new(driver.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    orch.flash(&controller, Some(tx), CancellationToken::new())
        .await
        .unwrap();

    let events = drain(rx);
    assert_eq!(completions(&events), 1);
    assert_eq!(errors(&events), 0);
    assert_eq!(logs_starting_with(&events, "Disconnect failed"), 1);
    assert!(matches!(events.last(), Some(FlashEvent::Complete)));
    assert_eq!(visited(&events).last(), Some(&FlashState::Completed));
}

#[tokio::test]
async fn unreachable_asset_never_touches_device() {
    let config = config();
    let fetcher = fetcher().with_status(e2e_common::asset_url("v1.2.0", "littlefs"), 404);
    let mut orch = Orchestrator::new(config, fetcher);
    orch.initialize().await.unwrap();
    orch.selection_mut().select_board("esp32s3").unwrap();

    let driver = MockDriver::default();
    let controller = FlashController::new(driver.clone());

    let err = orch
        .flash(&controller, None, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Flash(FlashError::AssetUnavailable { segment: 4, .. })
    ));
    assert_eq!(driver.calls(), ["disconnect"]);
}

#[tokio::test]
async fn cancelled_before_start() {
    let orch = orchestrator().await;
    let driver = MockDriver::default();
    let controller = FlashController::new(driver.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orch.flash(&controller, Some(tx), cancel).await.unwrap_err();

    assert!(matches!(err, Error::Flash(FlashError::Cancelled)));
    assert_eq!(driver.calls(), ["disconnect"]);
    assert_eq!(errors(&drain(rx)), 1);
}

#[tokio::test]
async fn upload_written_to_file() {
    let mut orch = orchestrator().await;
    orch.selection_mut()
        .set_custom_binary(CustomRole::Firmware, "custom.bin", vec![0xE9; 1000]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flash.bin");
    let controller = FlashController::new(FileDriver::new(&path, 8 * 1024 * 1024));

    orch.flash(&controller, None, CancellationToken::new())
        .await
        .unwrap();

    let flash = std::fs::read(&path).unwrap();
    assert_eq!(flash.len(), 8 * 1024 * 1024);
    assert_eq!(flash[0x10000..0x10000 + 1000], [0xE9; 1000]);
    assert_eq!(flash[0x10000 + 1000], 0xFF);

    let bootloader = asset_body("v1.2.0", "bootloader");
    assert_eq!(flash[..bootloader.len()], bootloader[..]);
}

#[tokio::test]
async fn file_driver_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flash.bin");
    let mut driver = FileDriver::new(&path, 0x1000);

    driver
        .connect(fpvgate_config::ChipFamily::Esp32C6)
        .await
        .unwrap();
    driver.write_segment(0x10, &[7; 16], None).await.unwrap();
    driver.disconnect().await.unwrap();

    driver
        .connect(fpvgate_config::ChipFamily::Esp32C6)
        .await
        .unwrap();
    let before = driver.flash_digest(0x10, 16).await.unwrap();
    driver.erase().await.unwrap();
    let after = driver.flash_digest(0x10, 16).await.unwrap();
    driver.disconnect().await.unwrap();

    assert_ne!(before, after);
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF; 0x1000]);
}

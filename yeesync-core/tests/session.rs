//! Session lifecycle and command gating against fake collaborators.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Call, FakeDevice, FakeLocator, FakeScreens, eventually};
use yeesync_core::{
    DeviceError, DeviceFault, DeviceSession, Error, ExecOutcome, LightState, Property, Rgb, SessionConfig, SessionState, SharedDevice,
    SkipReason, SyncConfig,
};

// ── Helpers ──────────────────────────────────────────────────────

fn config(fallback: Option<&str>) -> SessionConfig {
    SessionConfig {
        fallback_address: fallback.map(str::to_string),
        sync: SyncConfig {
            fps: 100,
            ..SyncConfig::default()
        },
    }
}

fn session_with(locator: Arc<FakeLocator>, fallback: Option<&str>) -> Arc<DeviceSession> {
    Arc::new(DeviceSession::new(
        config(fallback),
        locator,
        FakeScreens::showing(Rgb::new(200, 40, 40)),
    ))
}

/// A session whose discovery finds `device`, already initialized.
async fn ready_session(device: &Arc<FakeDevice>) -> Arc<DeviceSession> {
    let shared: SharedDevice = device.clone();
    let locator = FakeLocator::finding(vec![shared.clone()], shared);
    let session = session_with(locator, None);
    session.initialize().await.unwrap();
    session
}

// ── Initialization ───────────────────────────────────────────────

#[tokio::test]
async fn initialize_hydrates_discovered_device() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        session.light(),
        LightState {
            power: false,
            brightness: 50,
            color_temperature: 4000,
        }
    );
    assert_eq!(
        device.calls(),
        vec![
            Call::Connect,
            Call::Get(Property::Power),
            Call::Get(Property::Brightness),
            Call::Get(Property::ColorTemperature),
        ]
    );
    assert!(device.faults.get().is_some(), "fault sink registered");
}

#[tokio::test]
async fn empty_discovery_uses_fallback_address() {
    let device = FakeDevice::new("192.168.0.213");
    let locator = FakeLocator::finding(Vec::new(), device.clone());
    let session = session_with(locator.clone(), Some("192.168.0.213"));

    session.initialize().await.unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(*locator.requested.lock().unwrap(), vec!["192.168.0.213".to_string()]);
}

#[tokio::test]
async fn discovery_error_uses_fallback_address() {
    let device = FakeDevice::new("192.168.0.213");
    let locator = FakeLocator::failing(device.clone());
    let session = session_with(locator, Some("192.168.0.213"));

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn empty_discovery_without_fallback_fails() {
    let device = FakeDevice::new("10.0.0.5");
    let locator = FakeLocator::finding(Vec::new(), device.clone());
    let session = session_with(locator, None);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::NoDevice));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(device.calls().is_empty());
}

#[tokio::test]
async fn unparsable_property_is_fatal() {
    let device = FakeDevice::with_props("10.0.0.5", "on", "bright", "4000");
    let shared: SharedDevice = device.clone();
    let session = session_with(FakeLocator::finding(vec![shared.clone()], shared), None);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::InvalidProperty { name: "bright", .. }));
    assert_eq!(session.state(), SessionState::Failed);

    // No command reaches a failed session.
    assert_eq!(
        session.set_brightness(10).await,
        ExecOutcome::Skipped(SkipReason::NotReady)
    );
    assert_eq!(device.brightness_writes(), 0);
}

#[tokio::test]
async fn non_boolean_power_is_fatal() {
    let device = FakeDevice::with_props("10.0.0.5", "maybe", "10", "4000");
    let shared: SharedDevice = device.clone();
    let session = session_with(FakeLocator::finding(vec![shared.clone()], shared), None);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::InvalidProperty { name: "power", .. }));
}

#[tokio::test]
async fn powered_device_starts_music_mode() {
    let device = FakeDevice::with_props("10.0.0.5", "on", "80", "2700");
    let session = ready_session(&device).await;

    assert!(session.light().power);
    assert_eq!(device.calls().last(), Some(&Call::StartStreaming));
}

#[tokio::test]
async fn connect_failure_is_fatal() {
    let device = FakeDevice::new("10.0.0.5");
    device.fail_connect.store(true, Ordering::SeqCst);
    let shared: SharedDevice = device.clone();
    let session = session_with(FakeLocator::finding(vec![shared.clone()], shared), None);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Device(DeviceError::Timeout(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(device.calls(), vec![Call::Connect], "no property reads after a failed connect");
    assert!(session.sync().is_none());
}

#[tokio::test]
async fn music_mode_failure_does_not_fail_initialize() {
    let device = FakeDevice::with_props("10.0.0.5", "on", "80", "2700");
    device.fail_streaming.store(true, Ordering::SeqCst);
    let session = ready_session(&device).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.light().power);
    assert_eq!(device.count(|c| *c == Call::StartStreaming), 1);
    assert_eq!(session.set_brightness(30).await, ExecOutcome::Done);
}

#[tokio::test]
async fn hydrated_brightness_is_clamped_into_device_range() {
    for (raw, expected) in [("0", 1), ("150", 100), ("42", 42)] {
        let device = FakeDevice::with_props("10.0.0.5", "off", raw, "4000");
        let session = ready_session(&device).await;
        assert_eq!(session.light().brightness, expected, "bulb reported {raw}");
    }
}

#[tokio::test]
async fn initialize_runs_once() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized));
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(device.count(|c| *c == Call::Connect), 1);
}

#[tokio::test]
async fn commands_before_initialize_are_skipped() {
    let device = FakeDevice::new("10.0.0.5");
    let shared: SharedDevice = device.clone();
    let session = session_with(FakeLocator::finding(vec![shared.clone()], shared), None);

    assert_eq!(session.state(), SessionState::Initializing);
    assert_eq!(
        session.set_power(true).await,
        ExecOutcome::Skipped(SkipReason::NotReady)
    );
    assert!(device.calls().is_empty());
    assert!(!session.light().power);
}

// ── Command gate ─────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_exec_is_dropped_not_queued() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;
    device.hold_color_temperature.store(true, Ordering::SeqCst);

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.set_color_temperature(3000).await }
    });
    assert!(
        eventually(|| device.count(|c| *c == Call::ColorTemperature(3000)) == 1).await,
        "first command reached the device"
    );

    let second = session.set_brightness(20).await;
    assert_eq!(second, ExecOutcome::Skipped(SkipReason::Busy));

    device.release.notify_one();
    assert_eq!(first.await.unwrap(), ExecOutcome::Done);

    // The dropped command was never invoked, even after the gate freed.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(device.brightness_writes(), 0);

    // The gate is free again.
    device.hold_color_temperature.store(false, Ordering::SeqCst);
    assert_eq!(session.set_brightness(20).await, ExecOutcome::Done);
    assert_eq!(device.calls().last(), Some(&Call::Brightness(20)));
}

#[tokio::test]
async fn failed_command_is_contained() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    let outcome = session
        .exec("failing on purpose", |_| async { Err::<(), _>(Error::InvalidConfig("boom")) })
        .await;
    assert_eq!(outcome, ExecOutcome::Failed(Error::InvalidConfig("boom").to_string()));

    // The next command still runs.
    assert_eq!(session.set_color_temperature(5000).await, ExecOutcome::Done);
}

#[tokio::test]
async fn device_faults_leave_session_untouched() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;
    assert_eq!(session.set_sync_running(true).await, ExecOutcome::Done);

    let sink = device.faults.get().unwrap();
    for message in ["connection closed by device", "undecodable message: garbage"] {
        sink.send(DeviceFault {
            address: "10.0.0.5".into(),
            message: message.into(),
        })
        .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.is_syncing());
    assert_eq!(session.set_color_temperature(3500).await, ExecOutcome::Done);
    assert_eq!(device.count(|c| *c == Call::ColorTemperature(3500)), 1);

    session.shutdown().await;
}

// ── Setters ──────────────────────────────────────────────────────

#[tokio::test]
async fn power_on_and_off_manage_music_mode() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;
    let hydration = device.calls().len();

    assert_eq!(session.set_power(true).await, ExecOutcome::Done);
    assert!(session.light().power);
    assert_eq!(session.toggle_power().await, ExecOutcome::Done);
    assert!(!session.light().power);

    assert_eq!(
        device.calls()[hydration..],
        [
            Call::Power(true),
            Call::StartStreaming,
            Call::StopStreaming,
            Call::Power(false),
        ]
    );
}

#[tokio::test]
async fn setters_clamp_into_device_range() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    session.set_brightness(0).await;
    session.set_brightness(250).await;
    session.set_color_temperature(1000).await;
    session.set_color_temperature(9000).await;

    let calls = device.calls();
    assert!(calls.contains(&Call::Brightness(1)));
    assert!(calls.contains(&Call::Brightness(100)));
    assert!(calls.contains(&Call::ColorTemperature(1700)));
    assert!(calls.contains(&Call::ColorTemperature(6500)));
    assert_eq!(session.light().color_temperature, 6500);
}

#[tokio::test]
async fn brightness_targets_sync_while_running() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    assert_eq!(session.set_sync_running(true).await, ExecOutcome::Done);
    assert!(session.is_syncing());

    assert_eq!(session.set_brightness(40).await, ExecOutcome::Done);
    let sync = session.sync().unwrap();
    assert_eq!(sync.config().brightness, 40);

    assert_eq!(session.toggle_sync().await, ExecOutcome::Done);
    assert!(!session.is_syncing());

    // Stopped again: brightness goes to the bulb.
    let before = device.brightness_writes();
    assert_eq!(session.set_brightness(70).await, ExecOutcome::Done);
    assert_eq!(device.brightness_writes(), before + 1);
    assert_eq!(device.calls().last(), Some(&Call::Brightness(70)));
}

#[tokio::test]
async fn sync_settings_route_through_exec() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    assert_eq!(session.set_screen("2").await, ExecOutcome::Done);
    assert_eq!(session.set_smooth(-50).await, ExecOutcome::Done);
    assert_eq!(session.set_fps(60).await, ExecOutcome::Done);
    assert_eq!(session.set_sample_step(4).await, ExecOutcome::Done);

    let cfg = session.sync().unwrap().config();
    assert_eq!(cfg.screen, "2");
    assert!(cfg.smoothing.is_none());
    assert_eq!(cfg.fps, 60);
    assert_eq!(cfg.sample_step, 4);

    assert!(matches!(session.set_fps(0).await, ExecOutcome::Failed(_)));
    assert!(matches!(session.set_sample_step(0).await, ExecOutcome::Failed(_)));
    assert_eq!(session.sync().unwrap().config().fps, 60);
}

#[tokio::test]
async fn shutdown_stops_sync() {
    let device = FakeDevice::new("10.0.0.5");
    let session = ready_session(&device).await;

    session.set_sync_running(true).await;
    assert!(eventually(|| device.rgb_writes() > 0).await);

    session.shutdown().await;
    assert!(!session.is_syncing());

    let writes = device.calls().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.calls().len(), writes, "no writes after shutdown");
}

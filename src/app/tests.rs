use super::*;
use crate::config::PromptcapConfig;
use crate::error::RecorderError;
use crate::events::{EventFilter, PromptcapEvent};
use crate::media::{MediaKind, Orientation, RecordingMode, Resolution};
use crate::platform::{
    SimulatedOverlay, SimulatedPlatform, SimulatedPreviewSink, SimulatedRecorder,
};
use crate::recorder::SessionState;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Fixture {
    studio: Arc<Studio>,
    platform: Arc<SimulatedPlatform>,
    recorder: Arc<SimulatedRecorder>,
    overlay: Arc<SimulatedOverlay>,
    sink: Arc<SimulatedPreviewSink>,
    _output: TempDir,
}

fn fixture() -> Fixture {
    let output = TempDir::new().unwrap();
    let mut config = PromptcapConfig::default();
    config.capture.fragment_interval_ms = 10;
    config.export.output_dir = output.path().to_string_lossy().to_string();

    let platform = Arc::new(SimulatedPlatform::new());
    let recorder = Arc::new(SimulatedRecorder::new());
    let overlay = Arc::new(SimulatedOverlay::new());
    let sink = Arc::new(SimulatedPreviewSink::new());
    let backends = StudioBackends {
        platform: platform.clone(),
        recorder: recorder.clone(),
        compositor: overlay.clone(),
        preview_sink: sink.clone(),
    };

    Fixture {
        studio: Arc::new(Studio::new(config, backends).unwrap()),
        platform,
        recorder,
        overlay,
        sink,
        _output: output,
    }
}

fn spawn_loop(studio: &Arc<Studio>) -> JoinHandle<crate::error::Result<ShutdownReason>> {
    let studio = Arc::clone(studio);
    tokio::spawn(async move { studio.run().await })
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = PromptcapConfig::default();
    config.capture.mime_types.clear();

    let err = Studio::new(config, StudioBackends::simulated()).err().unwrap();
    assert_eq!(err.code(), "CONFIG_ERROR");
}

#[tokio::test]
async fn test_stream_request_follows_settings() {
    let f = fixture();

    let request = f.studio.stream_request();
    assert_eq!(request.mode, RecordingMode::Camera);
    assert_eq!(request.resolution, None);
    assert!(request.include_audio);

    f.studio.set_resolution(Orientation::Portrait).await.unwrap();
    f.studio
        .select_device(MediaKind::Video, Some("cam-usb".to_string()))
        .await
        .unwrap();
    f.studio.set_mode(RecordingMode::Combined).unwrap();

    let request = f.studio.stream_request();
    assert_eq!(request.mode, RecordingMode::Combined);
    assert_eq!(request.resolution, Some(Resolution::new(720, 1280)));
    assert_eq!(request.video_device_id.as_deref(), Some("cam-usb"));
}

#[tokio::test]
async fn test_unknown_device_is_rejected() {
    let f = fixture();

    let err = f
        .studio
        .select_device(MediaKind::Audio, Some("mic-missing".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DEVICE_UNAVAILABLE");
    assert_eq!(f.studio.settings().audio_device_id, None);
}

#[tokio::test]
async fn test_device_change_refreshes_preview() {
    let f = fixture();
    let first = f.studio.show_preview().await.unwrap();

    f.studio
        .select_device(MediaKind::Video, Some("cam-usb".to_string()))
        .await
        .unwrap();

    let current = f.studio.preview().current().unwrap();
    assert_ne!(current.id(), first);
    assert_eq!(f.sink.snapshot().session_id, Some(current.id()));
    assert_eq!(f.platform.live_tracks().len(), 1);
}

#[tokio::test]
async fn test_recording_round_trip_through_event_loop() {
    let f = fixture();
    let runner = spawn_loop(&f.studio);
    let mut timeline_events = f.studio.event_bus().subscribe_filtered(
        EventFilter::EventTypes(vec!["timeline_changed"]),
        "test",
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    f.studio.show_preview().await.unwrap();
    f.studio.start_session().await.unwrap();
    assert!(!f.studio.preview().is_showing());
    assert_eq!(f.studio.capture().state(), SessionState::Live);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let artifact = f.studio.stop_session().await.unwrap().unwrap();
    assert!(!artifact.is_empty());

    let event = timeout(Duration::from_secs(2), timeline_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        PromptcapEvent::TimelineChanged {
            clip_count: 1,
            can_undo: false,
            can_redo: false
        }
    ));
    eventually(|| f.studio.preview().is_showing()).await;

    let snapshot = f.studio.snapshot();
    assert_eq!(snapshot.session_state, SessionState::Complete);
    assert_eq!(snapshot.clips.len(), 1);
    assert_eq!(snapshot.clips[0].end, artifact.duration_secs());

    f.studio.shutdown().await.unwrap();
    let reason = timeout(Duration::from_secs(1), runner).await.unwrap().unwrap();
    assert!(matches!(reason, Ok(ShutdownReason::Requested(_))));
}

#[tokio::test]
async fn test_stop_request_event_stops_recording() {
    let f = fixture();
    let runner = spawn_loop(&f.studio);
    tokio::time::sleep(Duration::from_millis(20)).await;
    f.studio.set_mode(RecordingMode::Combined).unwrap();
    f.studio.start_session().await.unwrap();
    assert_eq!(f.overlay.mounted_count(), 2);

    f.studio
        .event_bus()
        .publish(PromptcapEvent::StopRequested {
            source: "keyboard".to_string(),
        })
        .await
        .unwrap();

    let artifact = timeout(Duration::from_secs(2), f.studio.capture().wait_for_completion())
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.is_some());
    assert_eq!(f.overlay.mounted_count(), 0);

    f.studio
        .event_bus()
        .publish(PromptcapEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "done".to_string(),
        })
        .await
        .unwrap();
    let reason = timeout(Duration::from_secs(1), runner).await.unwrap().unwrap();
    assert_eq!(reason.unwrap(), ShutdownReason::Requested("done".to_string()));
}

#[tokio::test]
async fn test_mode_is_locked_while_recording() {
    let f = fixture();
    f.studio.start_session().await.unwrap();

    let err = f.studio.set_mode(RecordingMode::Screen).unwrap_err();
    assert_eq!(err.code(), "INVALID_OPERATION");
    assert_eq!(f.studio.settings().mode, RecordingMode::Camera);

    f.studio.stop_session().await.unwrap();
    f.studio.set_mode(RecordingMode::Screen).unwrap();
}

#[tokio::test]
async fn test_failed_start_restores_preview() {
    let f = fixture();
    f.studio.show_preview().await.unwrap();
    f.recorder.fail_start(Some(RecorderError::StartFailed {
        details: "busy".to_string(),
    }));

    assert!(f.studio.start_session().await.is_err());

    assert_eq!(f.studio.capture().state(), SessionState::Failed);
    assert!(f.studio.preview().is_showing());
    assert!(f.sink.snapshot().muted);
}

#[tokio::test]
async fn test_timeline_commands_publish_changes() {
    let f = fixture();
    f.studio.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let artifact = f.studio.stop_session().await.unwrap().unwrap();
    f.studio.load_timeline(&artifact).await;
    let duration = artifact.duration_secs();

    let mut events = f.studio.event_bus().subscribe_filtered(
        EventFilter::EventTypes(vec!["timeline_changed"]),
        "test",
    );

    assert_eq!(f.studio.split(duration / 2.0).await.unwrap(), 1);
    assert!(matches!(
        events.try_recv().unwrap(),
        Some(PromptcapEvent::TimelineChanged { clip_count: 2, can_undo: true, .. })
    ));

    let err = f.studio.split(duration * 2.0).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_OPERATION");
    assert!(events.try_recv().unwrap().is_none());

    f.studio.reorder(0, 1).await.unwrap();
    assert_eq!(f.studio.delete_range(0.0, duration / 4.0).await.unwrap(), 1);
    assert_eq!(f.studio.snapshot().clips.len(), 1);

    assert!(f.studio.undo().await);
    assert!(f.studio.undo().await);
    assert_eq!(f.studio.snapshot().clips[0].start, 0.0);
    assert!(f.studio.redo().await);
    assert!(f.studio.snapshot().can_redo);

    f.studio.mark_in(0.0);
    f.studio.mark_out(duration);
    assert_eq!(f.studio.delete_selection().await.unwrap(), 2);
    assert!(f.studio.snapshot().clips.is_empty());
}

#[tokio::test]
async fn test_export_includes_edit_list_when_edited() {
    let f = fixture();

    let err = f.studio.export().await.unwrap_err();
    assert_eq!(err.code(), "COMPONENT_ERROR");

    f.studio.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let artifact = f.studio.stop_session().await.unwrap().unwrap();

    let plain = f.studio.export().await.unwrap();
    assert!(plain.edit_list_path.is_none());
    assert!(plain.media_path.starts_with(f._output.path()));

    f.studio.load_timeline(&artifact).await;
    f.studio.split(artifact.duration_secs() / 2.0).await.unwrap();
    let edited = f.studio.export().await.unwrap();
    assert!(edited.edit_list_path.unwrap().exists());
}

#[tokio::test]
async fn test_teleprompter_runs_with_recording() {
    let f = fixture();
    f.studio.load_script("First line here\nSecond line");

    assert_eq!(
        f.studio.snapshot().prompt_line.as_deref(),
        Some("First line here")
    );

    f.studio.start_session().await.unwrap();
    f.studio.stop_session().await.unwrap();
    assert_eq!(
        f.studio.snapshot().prompt_line.as_deref(),
        Some("First line here")
    );
}

#[tokio::test]
async fn test_shutdown_finalizes_live_recording() {
    let f = fixture();
    f.studio.set_mode(RecordingMode::Screen).unwrap();
    f.studio.start_session().await.unwrap();

    let exit_code = f.studio.shutdown().await.unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(f.studio.capture().state(), SessionState::Complete);
    assert!(f.platform.live_tracks().is_empty());
}

#[tokio::test]
async fn test_late_recording_complete_after_shutdown_keeps_camera_released() {
    let f = fixture();
    f.studio.show_preview().await.unwrap();
    f.studio.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let artifact = f.studio.stop_session().await.unwrap().unwrap();

    assert_eq!(f.studio.shutdown().await.unwrap(), 0);
    assert!(f.platform.live_tracks().is_empty());

    f.studio.on_recording_complete(&artifact).await;

    assert!(!f.studio.preview().is_showing());
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(f.studio.negotiator().registry().live_count(), 0);
    assert!(!f.studio.settings().preview_enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_loop_shutdown_leaves_no_live_tracks() {
    for _ in 0..10 {
        let f = fixture();
        let runner = spawn_loop(&f.studio);
        f.studio.show_preview().await.unwrap();
        f.studio.start_session().await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        f.studio
            .event_bus()
            .publish(PromptcapEvent::StopRequested {
                source: "timer".to_string(),
            })
            .await
            .unwrap();
        timeout(Duration::from_secs(2), f.studio.capture().wait_for_completion())
            .await
            .unwrap()
            .unwrap();

        f.studio.shutdown().await.unwrap();
        timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(f.platform.live_tracks().is_empty());
        assert_eq!(f.studio.negotiator().registry().live_count(), 0);
    }
}

#[tokio::test]
async fn test_show_preview_is_rejected_while_recording() {
    let f = fixture();
    f.studio.start_session().await.unwrap();
    let live_before = f.platform.live_tracks().len();
    assert_eq!(live_before, 2);

    let err = f.studio.show_preview().await.unwrap_err();

    assert_eq!(err.code(), "INVALID_OPERATION");
    assert_eq!(f.studio.capture().state(), SessionState::Live);
    assert_eq!(f.platform.live_tracks().len(), live_before);
    assert!(!f.studio.preview().is_showing());
    assert!(!f.studio.settings().preview_enabled);

    f.studio.stop_session().await.unwrap();
    f.studio.show_preview().await.unwrap();
    assert!(f.studio.preview().is_showing());
}

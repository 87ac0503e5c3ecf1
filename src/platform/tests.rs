use super::*;
use crate::config::PromptcapConfig;
use crate::media::{camera_constraints, display_constraints, ConstraintInputs, Orientation};
use std::time::Duration;

fn test_config() -> PromptcapConfig {
    PromptcapConfig::default()
}

fn camera_request(config: &PromptcapConfig) -> CaptureConstraints {
    camera_constraints(
        &ConstraintInputs {
            include_audio: true,
            ..Default::default()
        },
        &config.camera,
        &config.audio,
    )
}

#[tokio::test]
async fn test_user_media_picks_default_devices() {
    let config = test_config();
    let platform = SimulatedPlatform::new();

    let tracks = platform
        .get_user_media(&camera_request(&config))
        .await
        .unwrap();

    assert_eq!(tracks.len(), 2);
    assert_eq!(
        tracks[0].source(),
        &TrackSource::device(MediaKind::Video, "cam-front")
    );
    assert_eq!(
        tracks[1].source(),
        &TrackSource::device(MediaKind::Audio, "mic-builtin")
    );
    assert!(tracks.iter().all(|t| t.is_live()));
    assert_eq!(platform.live_tracks().len(), 2);
}

#[tokio::test]
async fn test_unknown_device_is_unavailable() {
    let config = test_config();
    let constraints = camera_constraints(
        &ConstraintInputs {
            video_device_id: Some("missing"),
            ..Default::default()
        },
        &config.camera,
        &config.audio,
    );

    let err = SimulatedPlatform::new()
        .get_user_media(&constraints)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AcquisitionError::DeviceUnavailable { device_id: Some(ref id), .. } if id == "missing"
    ));
}

#[tokio::test]
async fn test_prompt_denied_is_permission_error() {
    let config = test_config();
    let platform = SimulatedPlatform::new();
    platform.set_permission(MediaKind::Video, PermissionState::Prompt);
    platform.set_prompt_response(PermissionState::Denied);

    let err = platform
        .get_user_media(&camera_request(&config))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AcquisitionError::PermissionDenied {
            kind: MediaKind::Video
        }
    );
    assert_eq!(platform.permission(MediaKind::Video), PermissionState::Denied);
    assert!(platform.issued_tracks().is_empty());
}

#[tokio::test]
async fn test_unauthorized_devices_have_empty_ids() {
    let platform = SimulatedPlatform::new();
    platform.set_permission(MediaKind::Audio, PermissionState::Prompt);

    let devices = platform.enumerate_devices().await.unwrap();
    let audio: Vec<_> = devices
        .iter()
        .filter(|d| d.kind == MediaKind::Audio)
        .collect();

    assert_eq!(audio.len(), 2);
    assert!(audio.iter().all(|d| !d.is_authorized()));
    assert!(devices
        .iter()
        .filter(|d| d.kind == MediaKind::Video)
        .all(|d| d.is_authorized()));
}

#[tokio::test]
async fn test_forced_orientation_overrides_request() {
    let config = test_config();
    let platform = SimulatedPlatform::new();
    platform.force_orientation(Some(Orientation::Landscape));

    let constraints = camera_constraints(
        &ConstraintInputs {
            resolution: Some(Resolution::for_orientation((1280, 720), Orientation::Portrait)),
            ..Default::default()
        },
        &config.camera,
        &config.audio,
    );
    let tracks = platform.get_user_media(&constraints).await.unwrap();

    let delivered = tracks[0].settings().resolution().unwrap();
    assert_eq!(delivered, Resolution::new(1280, 720));
}

#[tokio::test]
async fn test_display_capture_unsupported() {
    let config = test_config();
    let platform = SimulatedPlatform::new();
    platform.set_display_supported(false);

    let constraints = display_constraints(&ConstraintInputs::default(), &config.camera, &config.audio);
    let err = platform.get_display_media(&constraints).await.unwrap_err();

    assert_eq!(err.code(), "PLATFORM_UNSUPPORTED");
}

#[tokio::test]
async fn test_ending_display_fires_ended_signal() {
    let config = test_config();
    let platform = SimulatedPlatform::new();
    let constraints = display_constraints(&ConstraintInputs::default(), &config.camera, &config.audio);
    let tracks = platform.get_display_media(&constraints).await.unwrap();
    let mut ended = tracks[0].ended();

    assert_eq!(platform.end_display_capture(), 1);

    tokio::time::timeout(Duration::from_secs(1), ended.wait_for(|e| *e))
        .await
        .expect("ended signal")
        .unwrap();
    assert!(!tracks[0].is_live());
}

#[test]
fn test_stopping_does_not_fire_ended() {
    let track = SimulatedTrack::new(
        MediaKind::Video,
        TrackSource::Display,
        "screen",
        TrackSettings::default(),
    );
    let ended = track.ended();

    track.stop();
    track.end();

    assert!(!*ended.borrow());
    assert!(track.is_stopped());
    assert_eq!(track.end_listener_count(), 1);
    drop(ended);
    assert_eq!(track.end_listener_count(), 0);
}

#[tokio::test]
async fn test_unplug_notifies_and_ends_tracks() {
    let config = test_config();
    let platform = SimulatedPlatform::new();
    let mut changes = platform.device_changes();
    let tracks = platform
        .get_user_media(&camera_request(&config))
        .await
        .unwrap();

    assert!(platform.unplug_device("cam-front"));
    assert!(!platform.unplug_device("cam-front"));

    tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!tracks[0].is_live());
    assert!(tracks[1].is_live());
}

#[tokio::test]
async fn test_recorder_emits_fragments_in_order() {
    let recorder = SimulatedRecorder::new();
    let track: Arc<dyn MediaTrack> = SimulatedTrack::new(
        MediaKind::Video,
        TrackSource::Display,
        "screen",
        TrackSettings::default(),
    );

    let mut handle = recorder
        .start(
            vec![track],
            RecorderOptions {
                mime_type: "video/webm".to_string(),
                timeslice: Duration::from_millis(10),
            },
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(35)).await;
    handle.control.request_stop();

    let mut fragments = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = handle.events.recv().await {
            match event {
                RecorderEvent::Data(bytes) => fragments.push(bytes),
                RecorderEvent::Stopped => return true,
                RecorderEvent::Error(e) => panic!("unexpected recorder error: {}", e),
            }
        }
        false
    })
    .await
    .unwrap();

    assert!(drained);
    assert!(fragments.len() >= 2);
    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(fragment.as_ref(), format!("fragment-{};", i).as_bytes());
    }
    assert_eq!(recorder.started_count(), 1);
}

#[tokio::test]
async fn test_recorder_rejects_unsupported_type() {
    let recorder = SimulatedRecorder::unsupported();
    let track: Arc<dyn MediaTrack> = SimulatedTrack::new(
        MediaKind::Audio,
        TrackSource::device(MediaKind::Audio, "mic"),
        "mic",
        TrackSettings::default(),
    );

    let err = recorder
        .start(
            vec![track],
            RecorderOptions {
                mime_type: "video/webm".to_string(),
                timeslice: Duration::from_millis(10),
            },
        )
        .unwrap_err();
    assert!(matches!(err, RecorderError::Unsupported { .. }));
}

#[test]
fn test_overlay_stop_control() {
    let overlay = SimulatedOverlay::new();
    let token = CancellationToken::new();

    assert!(!overlay.click_stop_control());
    let id = overlay.mount_stop_control(token.clone()).unwrap();
    assert_eq!(overlay.mounted_count(), 1);

    assert!(overlay.click_stop_control());
    assert!(token.is_cancelled());

    overlay.unmount(id);
    assert_eq!(overlay.mounted_count(), 0);
    assert!(!overlay.click_stop_control());
}

#[test]
fn test_preview_sink_records_attachments() {
    let sink = SimulatedPreviewSink::new();
    let session = Uuid::new_v4();

    sink.attach(session, &[]);
    sink.set_muted(true);
    sink.play().unwrap();

    let state = sink.snapshot();
    assert_eq!(state.session_id, Some(session));
    assert!(state.muted && state.playing);

    sink.block_playback(true);
    assert!(sink.play().is_err());

    sink.detach();
    assert_eq!(sink.snapshot().session_id, None);
    assert_eq!(sink.snapshot().attach_count, 1);
}

use super::*;
use crate::config::PromptcapConfig;
use crate::error::{PromptcapError, RecorderError, SessionError};
use crate::events::{EventBus, EventFilter, EventReceiver, PromptcapEvent};
use crate::media::{DeviceRegistry, MediaKind, RecordingMode, TrackSource};
use crate::negotiator::{StreamNegotiator, StreamRequest};
use crate::platform::{
    MediaTrack, MountedOverlay, SimulatedOverlay, SimulatedPlatform, SimulatedRecorder,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Fixture {
    platform: Arc<SimulatedPlatform>,
    recorder: Arc<SimulatedRecorder>,
    overlay: Arc<SimulatedOverlay>,
    event_bus: Arc<EventBus>,
    manager: Arc<CaptureSessionManager>,
}

fn fixture_with(config: PromptcapConfig, recorder: SimulatedRecorder) -> Fixture {
    let platform = Arc::new(SimulatedPlatform::new());
    let recorder = Arc::new(recorder);
    let overlay = Arc::new(SimulatedOverlay::new());
    let event_bus = Arc::new(EventBus::new(256));
    let negotiator = Arc::new(StreamNegotiator::new(
        platform.clone(),
        DeviceRegistry::new(),
        &config,
        event_bus.clone(),
    ));
    let manager = Arc::new(CaptureSessionManager::new(
        negotiator,
        recorder.clone(),
        overlay.clone(),
        &config,
        event_bus.clone(),
    ));
    Fixture {
        platform,
        recorder,
        overlay,
        event_bus,
        manager,
    }
}

fn fast_config() -> PromptcapConfig {
    let mut config = PromptcapConfig::default();
    config.capture.fragment_interval_ms = 10;
    config
}

fn fixture() -> Fixture {
    fixture_with(fast_config(), SimulatedRecorder::new())
}

fn request(mode: RecordingMode) -> StreamRequest {
    StreamRequest {
        include_audio: true,
        ..StreamRequest::new(mode)
    }
}

fn state_events(bus: &EventBus) -> EventReceiver {
    bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["session_state_changed"]),
        "test-states",
    )
}

fn drain_states(receiver: &mut EventReceiver) -> Vec<SessionState> {
    let mut states = Vec::new();
    while let Ok(Some(event)) = receiver.try_recv() {
        if let PromptcapEvent::SessionStateChanged { state, .. } = event {
            states.push(state);
        }
    }
    states
}

fn screen_track(platform: &SimulatedPlatform) -> Arc<crate::platform::SimulatedTrack> {
    platform
        .issued_tracks()
        .into_iter()
        .find(|t| t.kind() == MediaKind::Video && t.source() == &TrackSource::Display)
        .expect("screen track issued")
}

#[test]
fn test_state_transitions() {
    use SessionState::*;

    assert!(Idle.can_transition_to(Acquiring));
    assert!(Acquiring.can_transition_to(Live));
    assert!(Acquiring.can_transition_to(Failed));
    assert!(Acquiring.can_transition_to(Idle));
    assert!(Live.can_transition_to(Stopping));
    assert!(Live.can_transition_to(Failed));
    assert!(Stopping.can_transition_to(Complete));
    assert!(Complete.can_transition_to(Acquiring));

    assert!(!Idle.can_transition_to(Live));
    assert!(!Live.can_transition_to(Complete));
    assert!(!Complete.can_transition_to(Stopping));
    assert!(!Idle.can_transition_to(Failed));

    assert!(Failed.can_start());
    assert!(!Live.can_start());
    assert!(Stopping.is_active());
    assert_eq!(Stopping.to_string(), "Stopping");
}

#[test]
fn test_session_rejects_invalid_transition() {
    let mut session = RecordingSession::new(RecordingMode::Camera, "video/webm");

    let err = session
        .transition(SessionState::Live, "go live")
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::InvalidTransition {
            from: SessionState::Idle,
            action: "go live"
        }
    );
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_artifact_concatenates_chunks_in_order() {
    let mut session = RecordingSession::new(RecordingMode::Screen, "video/webm;codecs=vp9,opus");
    assert_eq!(session.push_chunk(Bytes::from_static(b"abc")), 0);
    assert_eq!(session.push_chunk(Bytes::from_static(b"de")), 1);
    assert_eq!(session.push_chunk(Bytes::from_static(b"f")), 2);

    let artifact = session.assemble(Duration::from_millis(1500));

    assert_eq!(artifact.data.as_ref(), b"abcdef");
    assert_eq!(artifact.fragment_count, 3);
    assert_eq!(artifact.session_id, session.id());
    assert_eq!(artifact.mime_type, "video/webm;codecs=vp9,opus");
    assert_eq!(artifact.file_extension(), "webm");
    assert_eq!(artifact.duration_secs(), 1.5);
    assert_eq!(artifact.size(), 6);
}

#[tokio::test]
async fn test_camera_recording_lifecycle() {
    let f = fixture();
    let mut states = state_events(&f.event_bus);

    let session_id = f.manager.start(request(RecordingMode::Camera)).await.unwrap();
    assert_eq!(f.manager.state(), SessionState::Live);
    assert_eq!(f.manager.session_id(), Some(session_id));

    tokio::time::sleep(Duration::from_millis(45)).await;
    let artifact = timeout(Duration::from_secs(2), f.manager.stop())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(f.manager.state(), SessionState::Complete);
    assert_eq!(artifact.session_id, session_id);
    assert_eq!(artifact.mode, RecordingMode::Camera);
    assert_eq!(artifact.mime_type, "video/webm;codecs=vp9,opus");
    assert!(artifact.fragment_count >= 2);

    let expected: String = (0..artifact.fragment_count)
        .map(|i| format!("fragment-{};", i))
        .collect();
    assert_eq!(artifact.data.as_ref(), expected.as_bytes());

    assert_eq!(f.recorder.recorded_track_ids().len(), 2);
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(f.manager.last_artifact(), Some(artifact));
    assert_eq!(
        drain_states(&mut states),
        vec![
            SessionState::Acquiring,
            SessionState::Live,
            SessionState::Stopping,
            SessionState::Complete
        ]
    );
}

#[tokio::test]
async fn test_recording_complete_event_carries_artifact() {
    let f = fixture();
    let mut complete = f.event_bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["recording_complete"]),
        "test",
    );

    let session_id = f.manager.start(request(RecordingMode::Screen)).await.unwrap();
    f.manager.stop().await.unwrap();

    let event = timeout(Duration::from_secs(1), complete.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        PromptcapEvent::RecordingComplete { artifact } => {
            assert_eq!(artifact.session_id, session_id);
            assert_eq!(artifact.mode, RecordingMode::Screen);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_combined_mode_mounts_overlay_and_records_screen() {
    let f = fixture();

    f.manager.start(request(RecordingMode::Combined)).await.unwrap();

    let mounted = f.overlay.mounted();
    assert_eq!(mounted.len(), 2);
    assert!(mounted.contains(&MountedOverlay::StopControl));
    assert!(mounted
        .iter()
        .any(|m| matches!(m, MountedOverlay::SelfView { .. })));

    let screen = screen_track(&f.platform);
    assert_eq!(screen.end_listener_count(), 1);

    // Screen video plus the microphone; the camera video only feeds the self-view
    let recorded = f.recorder.recorded_track_ids();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.contains(&screen.id().to_string()));
    let camera_video = f
        .platform
        .issued_tracks()
        .into_iter()
        .find(|t| t.kind() == MediaKind::Video && t.source() != &TrackSource::Display)
        .unwrap();
    assert!(!recorded.contains(&camera_video.id().to_string()));

    f.manager.stop().await.unwrap();

    assert_eq!(f.overlay.mounted_count(), 0);
    assert_eq!(screen.end_listener_count(), 0);
    assert!(f.platform.live_tracks().is_empty());
}

#[tokio::test]
async fn test_screen_share_end_completes_without_stop_call() {
    let f = fixture();
    let mut states = state_events(&f.event_bus);
    f.manager.start(request(RecordingMode::Combined)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;

    assert_eq!(f.platform.end_display_capture(), 1);

    let artifact = timeout(Duration::from_secs(2), f.manager.wait_for_completion())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!artifact.is_empty());
    assert_eq!(f.manager.state(), SessionState::Complete);
    assert_eq!(f.overlay.mounted_count(), 0);
    assert_eq!(screen_track(&f.platform).end_listener_count(), 0);
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(
        drain_states(&mut states),
        vec![
            SessionState::Acquiring,
            SessionState::Live,
            SessionState::Stopping,
            SessionState::Complete
        ]
    );
}

#[tokio::test]
async fn test_screen_only_listens_for_end() {
    let f = fixture();
    f.manager.start(request(RecordingMode::Screen)).await.unwrap();

    assert_eq!(f.overlay.mounted_count(), 0);
    f.platform.end_display_capture();

    let artifact = timeout(Duration::from_secs(2), f.manager.wait_for_completion())
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.is_some());
    assert_eq!(f.manager.state(), SessionState::Complete);
}

#[tokio::test]
async fn test_overlay_stop_control_stops_recording() {
    let f = fixture();
    f.manager.start(request(RecordingMode::Combined)).await.unwrap();

    assert!(f.overlay.click_stop_control());

    let artifact = timeout(Duration::from_secs(2), f.manager.wait_for_completion())
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.is_some());
    assert_eq!(f.overlay.mounted_count(), 0);
}

#[tokio::test]
async fn test_acquisition_failure_is_retriable() {
    let f = fixture();
    let mut failures = f.event_bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["session_failed"]),
        "test",
    );
    f.platform
        .fail_display_media(Some(crate::error::AcquisitionError::PermissionDenied {
            kind: MediaKind::Video,
        }));

    let err = f
        .manager
        .start(request(RecordingMode::Combined))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PERMISSION_DENIED");
    assert_eq!(f.manager.state(), SessionState::Failed);
    assert!(f.manager.last_error().is_some());
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(f.overlay.mounted_count(), 0);
    assert_eq!(f.recorder.started_count(), 0);
    match failures.try_recv().unwrap() {
        Some(PromptcapEvent::SessionFailed { code, .. }) => assert_eq!(code, "PERMISSION_DENIED"),
        other => panic!("unexpected {:?}", other),
    }

    f.platform.fail_display_media(None);
    f.manager.start(request(RecordingMode::Combined)).await.unwrap();
    assert_eq!(f.manager.state(), SessionState::Live);
    f.manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_during_acquisition_cancels() {
    let f = fixture();
    f.platform
        .set_acquisition_delay(Duration::from_millis(200));

    let manager = f.manager.clone();
    let starting = tokio::spawn(async move { manager.start(request(RecordingMode::Camera)).await });

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(f.manager.state(), SessionState::Acquiring);
    assert_eq!(f.manager.stop().await.unwrap(), None);

    let result = timeout(Duration::from_secs(2), starting)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        result,
        Err(PromptcapError::Session(SessionError::Cancelled))
    ));
    assert_eq!(f.manager.state(), SessionState::Idle);
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(f.recorder.started_count(), 0);
}

#[tokio::test]
async fn test_cancel_after_camera_in_combined_mode_releases_camera() {
    let f = fixture();
    f.platform
        .set_acquisition_delay(Duration::from_millis(100));

    let manager = f.manager.clone();
    let starting =
        tokio::spawn(async move { manager.start(request(RecordingMode::Combined)).await });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(f.manager.request_stop("test"));

    let result = timeout(Duration::from_secs(2), starting)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_err());
    assert!(!f.platform.issued_tracks().is_empty());
    assert!(f.platform.live_tracks().is_empty());
    assert_eq!(f.overlay.mounted_count(), 0);
}

#[tokio::test]
async fn test_unsupported_recorder_touches_no_device() {
    let f = fixture_with(fast_config(), SimulatedRecorder::unsupported());

    let err = f
        .manager
        .start(request(RecordingMode::Camera))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RECORDER_UNSUPPORTED");
    assert_eq!(f.manager.state(), SessionState::Idle);
    assert!(f.platform.issued_tracks().is_empty());
}

#[tokio::test]
async fn test_mime_type_follows_preference_order() {
    let f = fixture_with(
        fast_config(),
        SimulatedRecorder::with_supported_types(vec![
            "video/mp4".to_string(),
            "video/webm".to_string(),
        ]),
    );

    assert_eq!(f.manager.select_mime_type().unwrap(), "video/webm");
}

#[tokio::test]
async fn test_recorder_start_failure_releases_everything() {
    let f = fixture();
    f.recorder.fail_start(Some(RecorderError::StartFailed {
        details: "encoder busy".to_string(),
    }));

    let err = f
        .manager
        .start(request(RecordingMode::Combined))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RECORDER_ERROR");
    assert_eq!(f.manager.state(), SessionState::Failed);
    assert_eq!(f.overlay.mounted_count(), 0);
    assert!(f.platform.live_tracks().is_empty());
}

#[tokio::test]
async fn test_overlay_failure_releases_streams() {
    let f = fixture();
    f.overlay.fail_stop_control(true);

    let err = f
        .manager
        .start(request(RecordingMode::Combined))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PromptcapError::Session(SessionError::Overlay { .. })
    ));
    assert_eq!(f.overlay.mounted_count(), 0);
    assert!(f.platform.live_tracks().is_empty());
}

#[tokio::test]
async fn test_recorder_error_fails_live_session() {
    let f = fixture();
    f.recorder.fail_after_fragments(Some(2));

    f.manager.start(request(RecordingMode::Combined)).await.unwrap();

    let err = timeout(Duration::from_secs(2), f.manager.wait_for_completion())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, PromptcapError::Session(SessionError::Failed { .. })));
    assert_eq!(f.manager.state(), SessionState::Failed);
    assert_eq!(f.overlay.mounted_count(), 0);
    assert!(f.platform.live_tracks().is_empty());
}

#[tokio::test]
async fn test_invalid_commands_are_rejected() {
    let f = fixture();

    let err = f.manager.stop().await.unwrap_err();
    assert_eq!(err.code(), "INVALID_OPERATION");
    assert!(!f.manager.request_stop("test"));

    f.manager.start(request(RecordingMode::Camera)).await.unwrap();
    let err = f
        .manager
        .start(request(RecordingMode::Camera))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PromptcapError::Session(SessionError::InvalidTransition {
            from: SessionState::Live,
            action: "start"
        })
    ));

    f.manager.stop().await.unwrap();
    let err = f.manager.stop().await.unwrap_err();
    assert_eq!(err.code(), "INVALID_OPERATION");
}

#[tokio::test]
async fn test_mobile_uses_shorter_fragment_interval() {
    let mut config = PromptcapConfig::default();
    config.capture.is_mobile = true;
    let f = fixture_with(config, SimulatedRecorder::new());

    f.manager.start(request(RecordingMode::Camera)).await.unwrap();

    let options = f.recorder.last_options().unwrap();
    assert_eq!(options.timeslice, Duration::from_millis(250));
    f.manager.shutdown().await;
    assert_eq!(f.manager.state(), SessionState::Complete);
}

#[tokio::test]
async fn test_consecutive_recordings() {
    let f = fixture();

    let first = f.manager.start(request(RecordingMode::Camera)).await.unwrap();
    f.manager.stop().await.unwrap();
    let second = f.manager.start(request(RecordingMode::Screen)).await.unwrap();
    let artifact = f.manager.stop().await.unwrap().unwrap();

    assert_ne!(first, second);
    assert_eq!(artifact.session_id, second);
    assert_eq!(f.recorder.started_count(), 2);
    assert!(f.platform.live_tracks().is_empty());
}

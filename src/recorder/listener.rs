use crate::platform::MediaTrack;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches a track and cancels `on_end` if the platform ends it
///
/// Used on the screen track so that dismissing screen sharing from the
/// system UI stops the recording.
pub struct TrackEndListener {
    track_id: String,
    disarm: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TrackEndListener {
    pub fn register(track: &Arc<dyn MediaTrack>, on_end: CancellationToken) -> Self {
        let track_id = track.id().to_string();
        let ended = track.ended();
        let disarm = CancellationToken::new();

        let task = tokio::spawn({
            let disarm = disarm.clone();
            let track_id = track_id.clone();
            async move {
                tokio::select! {
                    _ = disarm.cancelled() => {}
                    fired = wait_until_ended(ended) => {
                        if fired {
                            info!("Track {} was ended by the platform", track_id);
                            on_end.cancel();
                        }
                    }
                }
            }
        });

        debug!("Listening for end of track {}", track_id);
        Self {
            track_id,
            disarm,
            task: Some(task),
        }
    }

    /// Stop listening and wait until the watch is gone
    pub async fn remove(&mut self) {
        self.disarm.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("End listener for {} did not exit cleanly: {}", self.track_id, e);
            }
            debug!("Removed end listener for track {}", self.track_id);
        }
    }
}

impl Drop for TrackEndListener {
    fn drop(&mut self) {
        self.disarm.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn wait_until_ended(mut ended: watch::Receiver<bool>) -> bool {
    loop {
        let done = *ended.borrow_and_update();
        if done {
            return true;
        }
        if ended.changed().await.is_err() {
            return false;
        }
    }
}

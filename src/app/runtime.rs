use super::{ShutdownReason, Studio};
use crate::error::{EventBusError, Result};
use crate::events::{EventFilter, PromptcapEvent};
use crate::recorder::{Artifact, SessionState};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const TELEPROMPTER_TICK: Duration = Duration::from_millis(100);

impl Studio {
    /// Run the event loop until shutdown is requested or a signal arrives
    ///
    /// Reacts to stop requests from any control, loads finished recordings
    /// into the timeline and paces the teleprompter while recording.
    pub async fn run(&self) -> Result<ShutdownReason> {
        info!("Studio is running");

        self.catalog.start_watching();
        #[cfg(feature = "keyboard")]
        if let Some(keyboard) = &self.keyboard_handler {
            keyboard.start().await?;
        }

        let mut events = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec![
                "stop_requested",
                "recording_complete",
                "session_failed",
                "shutdown_requested",
            ]),
            "studio",
        );

        let mut ticker = tokio::time::interval(TELEPROMPTER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let terminate = terminate_signal();
        tokio::pin!(terminate);

        let reason = loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    break ShutdownReason::Requested("studio shut down".to_string());
                }
                _ = &mut ctrl_c => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    break ShutdownReason::Signal("SIGINT".to_string());
                }
                _ = &mut terminate => {
                    info!("Received SIGTERM signal");
                    break ShutdownReason::Signal("SIGTERM".to_string());
                }
                now = ticker.tick() => {
                    self.tick_teleprompter(now - last_tick);
                    last_tick = now;
                }
                event = events.recv() => match event {
                    Ok(PromptcapEvent::StopRequested { source }) => {
                        if !self.capture.request_stop(&source) {
                            debug!("Stop requested by {} but nothing is recording", source);
                        }
                    }
                    Ok(PromptcapEvent::RecordingComplete { artifact }) => {
                        self.on_recording_complete(&artifact).await;
                    }
                    Ok(PromptcapEvent::SessionFailed { .. }) => {
                        self.on_session_failed().await;
                    }
                    Ok(PromptcapEvent::ShutdownRequested { reason, .. }) => {
                        break ShutdownReason::Requested(reason);
                    }
                    Ok(_) => {}
                    Err(EventBusError::ChannelClosed) => {
                        break ShutdownReason::Error("event bus closed".to_string());
                    }
                    Err(e) => warn!("Studio event loop: {}", e),
                },
            }
        };

        info!("Studio loop exiting: {:?}", reason);
        Ok(reason)
    }

    pub(super) async fn on_recording_complete(&self, artifact: &Artifact) {
        info!(
            "Loading recording {} ({:.1}s) into the timeline",
            artifact.id,
            artifact.duration_secs()
        );
        self.load_timeline(artifact).await;
        if let Some(prompter) = self.teleprompter.lock().as_mut() {
            prompter.pause();
        }
        self.restore_preview().await;
    }

    async fn on_session_failed(&self) {
        if let Some(prompter) = self.teleprompter.lock().as_mut() {
            prompter.pause();
        }
        self.restore_preview().await;
    }

    fn tick_teleprompter(&self, elapsed: Duration) {
        if self.capture.state() != SessionState::Live {
            return;
        }
        let mut teleprompter = self.teleprompter.lock();
        if let Some(prompter) = teleprompter.as_mut() {
            if prompter.tick(elapsed) {
                if let Some(line) = prompter.current_line() {
                    info!("Prompt: {}", line);
                }
            }
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

use crate::error::Result;
use crate::events::{EventBus, PromptcapEvent};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the studio to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    StopRecording,
    Quit,
}

/// Map a key to its action; unbound keys are ignored
pub fn key_action(code: KeyCode) -> Option<KeyAction> {
    match code {
        KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyAction::StopRecording),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

impl KeyAction {
    fn into_event(self) -> PromptcapEvent {
        match self {
            KeyAction::StopRecording => PromptcapEvent::StopRequested {
                source: "keyboard".to_string(),
            },
            KeyAction::Quit => PromptcapEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            },
        }
    }
}

/// Terminal stop control for the CLI
///
/// `s` stops the live recording, `q` or Esc quits.
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Start listening for key presses on a blocking thread
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard controls: 's' stops recording, 'q' quits");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        let handle = task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }
            debug!("Raw mode enabled");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key = match event::read() {
                            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
                            _ => continue,
                        };
                        let Some(action) = key_action(key.code) else {
                            debug!("Unbound key: {:?}", key.code);
                            continue;
                        };

                        info!("Key {:?} -> {:?}", key.code, action);
                        let event_bus = Arc::clone(&event_bus);
                        runtime_handle.spawn(async move {
                            if let Err(e) = event_bus.publish(action.into_event()).await {
                                warn!("Failed to publish keyboard event: {}", e);
                            }
                        });
                        if action == KeyAction::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stop listening and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Keyboard task did not exit cleanly: {}", e);
            }
        }

        let _ = disable_raw_mode();
        debug!("Keyboard input handler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(key_action(KeyCode::Char('s')), Some(KeyAction::StopRecording));
        assert_eq!(key_action(KeyCode::Char('q')), Some(KeyAction::Quit));
        assert_eq!(key_action(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(key_action(KeyCode::Char(' ')), None);
    }

    #[test]
    fn test_actions_map_to_events() {
        assert_eq!(
            KeyAction::StopRecording.into_event().event_type(),
            "stop_requested"
        );
        assert_eq!(KeyAction::Quit.into_event().event_type(), "shutdown_requested");
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let handler = KeyboardInputHandler::new(Arc::new(EventBus::new(16)));

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}

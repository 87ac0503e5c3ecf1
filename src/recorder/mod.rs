//! Camera, screen and combined recording sessions.
//!
//! [`CaptureSessionManager`] walks a recording through
//! `Idle -> Acquiring -> Live -> Stopping -> Complete` (or `Failed`),
//! acquiring streams through the negotiator, mounting the combined-mode
//! overlay and watching the screen track for an external end.

mod listener;
mod manager;
mod overlay;
mod state;
#[cfg(test)]
mod tests;

pub use listener::TrackEndListener;
pub use manager::CaptureSessionManager;
pub use overlay::OverlayGuard;
pub use state::{extension_for_mime, Artifact, OverlayElements, RecordingSession, SessionState};

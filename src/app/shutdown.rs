use super::Studio;
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl Studio {
    /// Finalize any recording and release every device
    ///
    /// Returns the process exit code: 0 when everything stopped cleanly.
    pub async fn shutdown(&self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();
        self.settings.lock().preview_enabled = false;

        let mut exit_code = 0;

        #[cfg(feature = "keyboard")]
        if let Some(keyboard) = &self.keyboard_handler {
            if let Err(e) = keyboard.stop().await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        if timeout(CAPTURE_STOP_TIMEOUT, self.capture.shutdown())
            .await
            .is_err()
        {
            error!("Capture session did not stop within {:?}", CAPTURE_STOP_TIMEOUT);
            exit_code = 1;
        }

        self.preview.hide().await;
        self.catalog.stop_watching().await;

        let live = self.negotiator.registry().live_count();
        if live > 0 {
            error!("{} device bindings still live after shutdown", live);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}

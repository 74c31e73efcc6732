use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::platform::whatsapp::chat_id;
use crate::platform::{truncate_for_log, Transport};

/// Send attempts per message, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Sends replies through the transport with bounded retry.
pub struct DeliveryAgent {
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl DeliveryAgent {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Total send attempts per message; values below one mean one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Deliver `message` to `recipient` (a phone number or chat id).
    ///
    /// Fails at once if the transport is not ready; otherwise returns the
    /// last send error after all attempts are used.
    pub async fn deliver(&self, recipient: &str, message: &str) -> Result<()> {
        if !self.transport.is_ready() {
            error!("Error sending message to {}: transport not ready", recipient);
            bail!("WhatsApp client not ready");
        }

        let address = chat_id(recipient);
        let attempts = self.max_attempts;
        let mut attempt = 1;

        loop {
            match self.transport.send_message(&address, message).await {
                Ok(()) => {
                    info!(
                        "Message sent to {}: {}",
                        recipient,
                        truncate_for_log(message, 50)
                    );
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Retry sending message to {}, attempts left: {} ({:#})",
                        recipient,
                        attempts - attempt,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!("Error sending message to {}: {:#}", recipient, e);
                    return Err(e).with_context(|| {
                        format!("Failed to deliver to {} after {} attempts", recipient, attempts)
                    });
                }
            }
        }
    }
}

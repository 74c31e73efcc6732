use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{error, info, warn};

use crate::platform::whatsapp::{chat_id, CONTACT_SUFFIX};
use crate::platform::Transport;

/// Pause between two announcement sends
pub const RECIPIENT_DELAY: Duration = Duration::from_secs(2);

/// International number ("+15550100000") or an already-suffixed contact id
const RECIPIENT_PATTERN: &str = r"^\+\d{10,15}$|^\d{10,15}@c\.us$";

/// Outcome of one announcement run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One-time startup announcement to a configured list of numbers
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    recipients: Vec<String>,
    bot_name: String,
    send_to_self: bool,
    recipient_delay: Duration,
    pattern: Regex,
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn Transport>,
        recipients: Vec<String>,
        bot_name: impl Into<String>,
    ) -> Result<Self> {
        let pattern = Regex::new(RECIPIENT_PATTERN).context("Invalid recipient pattern")?;
        Ok(Self {
            transport,
            recipients,
            bot_name: bot_name.into(),
            send_to_self: false,
            recipient_delay: RECIPIENT_DELAY,
            pattern,
        })
    }

    /// Also announce to the bot's own number.
    pub fn with_self_announcement(mut self, enabled: bool) -> Self {
        self.send_to_self = enabled;
        self
    }

    pub fn is_valid_recipient(&self, recipient: &str) -> bool {
        self.pattern.is_match(recipient.trim())
    }

    /// Send the welcome message to every valid recipient.
    ///
    /// Each recipient is handled on its own: invalid entries are skipped and
    /// a failed send does not stop the remaining ones.
    pub async fn run(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        if !self.transport.is_ready() {
            warn!("Client not fully ready, skipping welcome message");
            return report;
        }

        if self.recipients.is_empty() && !self.send_to_self {
            info!("No broadcast recipients configured, skipping welcome message");
            return report;
        }

        let welcome = welcome_message(&self.bot_name, Local::now());
        info!(
            "Sending welcome message to {} recipient(s): {}",
            self.recipients.len(),
            self.recipients.join(", ")
        );

        let mut first = true;
        for recipient in &self.recipients {
            let recipient = recipient.trim();
            if !self.is_valid_recipient(recipient) {
                warn!("Invalid phone number format: {}, skipping", recipient);
                report.skipped += 1;
                continue;
            }

            if !first {
                tokio::time::sleep(self.recipient_delay).await;
            }
            first = false;

            let address = normalize_recipient(recipient);
            info!(
                "Attempting to send welcome message to: {} (formatted as: {})",
                recipient, address
            );
            match self.transport.send_message(&address, &welcome).await {
                Ok(()) => {
                    info!("Welcome message sent successfully to: {}", recipient);
                    report.sent += 1;
                }
                Err(e) => {
                    error!("Failed to send welcome message to {}: {:#}", recipient, e);
                    report.failed += 1;
                }
            }
        }

        if self.send_to_self {
            match self.transport.own_address() {
                Some(own) => match self.transport.send_message(&own, &welcome).await {
                    Ok(()) => {
                        info!("Welcome message sent to self (bot number)");
                        report.sent += 1;
                    }
                    Err(e) => {
                        error!("Failed to send welcome message to self: {:#}", e);
                        report.failed += 1;
                    }
                },
                None => warn!("Own address unknown, skipping welcome message to self"),
            }
        }

        report
    }
}

/// Contact id for a validated recipient.
fn normalize_recipient(recipient: &str) -> String {
    if recipient.contains(CONTACT_SUFFIX) {
        return recipient.to_string();
    }
    let digits: String = recipient.chars().filter(|c| c.is_ascii_digit()).collect();
    chat_id(&digits)
}

pub fn welcome_message(bot_name: &str, started: DateTime<Local>) -> String {
    format!(
        "🤖 {} is now online and ready!

✅ Bot Status: Active
🕐 Started: {}

Available commands:
🌤️ /weather [location] - Get weather info
🔤 /translate [text] - Translate text
🔍 /search [query] - Search information
❓ /help - Show all commands

Send me any message to get started! 🚀",
        bot_name,
        started.format("%Y-%m-%d %H:%M:%S")
    )
}

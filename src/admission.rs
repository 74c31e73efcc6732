use std::fmt;

use tracing::{debug, info, warn};

use crate::platform::whatsapp::{bare_number, is_group_address};
use crate::platform::InboundMessage;

/// Commands that pass the `CommandOnly` gate
pub const COMMAND_PREFIXES: [&str; 4] = ["/weather", "/translate", "/search", "/help"];

/// Which inbound messages the bot answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    #[default]
    AdminOnly,
    CommandOnly,
    DirectOnly,
    All,
}

impl AdmissionMode {
    /// Parse a configured mode name. Unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin_only" => Some(AdmissionMode::AdminOnly),
            "command_only" => Some(AdmissionMode::CommandOnly),
            "direct_messages_only" | "direct_only" => Some(AdmissionMode::DirectOnly),
            "all" => Some(AdmissionMode::All),
            _ => None,
        }
    }

    /// Resolve a configured mode name, falling back to `AdminOnly` for
    /// anything unrecognized.
    pub fn from_config(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            warn!(
                "Unknown BOT_RESPONSE_MODE: {}, defaulting to admin_only",
                raw
            );
            AdmissionMode::AdminOnly
        })
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionMode::AdminOnly => write!(f, "admin_only"),
            AdmissionMode::CommandOnly => write!(f, "command_only"),
            AdmissionMode::DirectOnly => write!(f, "direct_messages_only"),
            AdmissionMode::All => write!(f, "all"),
        }
    }
}

/// Admin phone numbers, reduced to their digits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminAllowList {
    entries: Vec<String>,
}

impl AdminAllowList {
    /// Build from configured numbers in any formatting ("+1 555-0100").
    /// Entries without a single digit are dropped: an empty pattern would
    /// match every sender.
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<String> = Vec::new();
        for number in numbers {
            let raw = number.as_ref();
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                if !raw.trim().is_empty() {
                    warn!("Ignoring admin number without digits: {}", raw);
                }
                continue;
            }
            if !entries.contains(&digits) {
                entries.push(digits);
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the sender's bare number contains any admin entry.
    pub fn matches(&self, sender_id: &str) -> bool {
        let number = bare_number(sender_id);
        self.entries.iter().any(|entry| number.contains(entry.as_str()))
    }
}

/// Decide whether the bot should answer `message`.
pub fn decide(message: &InboundMessage, mode: AdmissionMode, allow_list: &AdminAllowList) -> bool {
    let from = message.sender_id.as_str();

    // Never answer ourselves (reply loops) or groups.
    if message.is_from_self {
        return false;
    }
    if message.is_group || is_group_address(from) {
        debug!("Ignoring group message from: {}", from);
        return false;
    }

    match mode {
        AdmissionMode::AdminOnly => admin_allows(from, allow_list),
        AdmissionMode::CommandOnly => {
            let text = message.text.trim().to_lowercase();
            if COMMAND_PREFIXES.iter().any(|cmd| text.starts_with(cmd)) {
                info!("Bot command detected from: {}", from);
                true
            } else {
                debug!("Ignoring non-command message from: {}", from);
                false
            }
        }
        AdmissionMode::DirectOnly => {
            if is_group_address(from) {
                return false;
            }
            info!("Direct message from: {}", from);
            true
        }
        AdmissionMode::All => {
            info!("Message from: {}", from);
            true
        }
    }
}

fn admin_allows(from: &str, allow_list: &AdminAllowList) -> bool {
    if allow_list.matches(from) {
        info!("Message from admin number: {}", from);
        true
    } else {
        debug!("Ignoring message from non-admin: {}", from);
        false
    }
}

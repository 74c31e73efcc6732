pub mod whatsapp;

use anyhow::Result;
use async_trait::async_trait;

/// A message received from the transport
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Transport identity of the sender (e.g. "15550100@c.us")
    pub sender_id: String,
    /// The message text
    pub text: String,
    /// Sent by the bot's own account
    pub is_from_self: bool,
    /// Posted in a group chat
    pub is_group: bool,
}

/// Lifecycle and message events emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Qr(String),
    Authenticated,
    AuthFailure(String),
    Ready,
    Disconnected(String),
    Message(InboundMessage),
}

/// Outbound surface of a messaging transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the connection can currently send messages.
    fn is_ready(&self) -> bool;

    /// The bot's own address, once known.
    fn own_address(&self) -> Option<String>;

    /// Send `text` to a fully-qualified transport address.
    async fn send_message(&self, address: &str, text: &str) -> Result<()>;
}

/// Shorten text for log lines, respecting char boundaries.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// In-memory transport for tests
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::Transport;

    pub struct RecordingTransport {
        pub ready: AtomicBool,
        own_address: Option<String>,
        failing: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        pub fn ready() -> Self {
            Self {
                ready: AtomicBool::new(true),
                own_address: None,
                failing: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn not_ready() -> Self {
            let transport = Self::ready();
            transport.ready.store(false, Ordering::SeqCst);
            transport
        }

        /// Make every send to `address` fail.
        pub fn failing_for(mut self, address: &str) -> Self {
            self.failing.push(address.to_string());
            self
        }

        pub fn with_own_address(mut self, address: &str) -> Self {
            self.own_address = Some(address.to_string());
            self
        }

        /// Successful sends as (address, text)
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_addresses(&self) -> Vec<String> {
            self.sent().into_iter().map(|(address, _)| address).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn own_address(&self) -> Option<String> {
            self.own_address.clone()
        }

        async fn send_message(&self, address: &str, text: &str) -> Result<()> {
            if self.failing.iter().any(|a| a == address) {
                bail!("simulated send failure to {}", address);
            }
            self.sent
                .lock()
                .unwrap()
                .push((address.to_string(), text.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_log("hello", 50), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "a".repeat(60);
        let out = truncate_for_log(&text, 50);
        assert_eq!(out.len(), 53);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_multibyte() {
        let out = truncate_for_log("héllo wörld", 3);
        assert_eq!(out, "hél...");
    }
}

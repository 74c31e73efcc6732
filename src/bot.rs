use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::admission::{self, AdminAllowList, AdmissionMode};
use crate::api::ApiClient;
use crate::broadcast::Broadcaster;
use crate::command;
use crate::config::Config;
use crate::delivery::DeliveryAgent;
use crate::platform::{truncate_for_log, InboundMessage, Transport, TransportEvent};
use crate::router::CommandRouter;

/// Reply produced for an admitted message
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Kind of command the message was classified as
    pub kind: &'static str,
    pub text: String,
}

/// Shared application state, read-only once built
pub struct AppState {
    mode: AdmissionMode,
    allow_list: AdminAllowList,
    router: CommandRouter,
    delivery: DeliveryAgent,
    broadcaster: Broadcaster,
    ready_delay: Duration,
}

impl AppState {
    pub fn new(
        config: &Config,
        mode: AdmissionMode,
        allow_list: AdminAllowList,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let broadcaster = Broadcaster::new(
            Arc::clone(&transport),
            config.broadcast_recipients(),
            config.bot.name.clone(),
        )?
        .with_self_announcement(config.bot.send_welcome_to_self);

        Ok(Self {
            mode,
            allow_list,
            router: CommandRouter::new(ApiClient::new(config.api.clone())),
            delivery: DeliveryAgent::new(transport)
                .with_max_attempts(config.whatsapp.send_attempts),
            broadcaster,
            ready_delay: Duration::from_secs(config.whatsapp.ready_delay_secs),
        })
    }

    /// Reply for `message`, or `None` when the bot stays silent.
    pub async fn process_message(&self, message: &InboundMessage) -> Option<Reply> {
        if message.text.is_empty() {
            return None;
        }
        if !admission::decide(message, self.mode, &self.allow_list) {
            return None;
        }

        info!(
            "Received bot message from {}: {}",
            message.sender_id,
            truncate_for_log(&message.text, 50)
        );

        let command = command::classify(&message.text);
        Some(Reply {
            kind: command.kind(),
            text: self.router.dispatch(&command).await,
        })
    }
}

/// Consume transport events until the stream ends.
pub async fn run(state: Arc<AppState>, mut events: mpsc::Receiver<TransportEvent>) -> Result<()> {
    let mut welcome_scheduled = false;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Qr(code) => {
                info!("QR code received, scan with your phone:");
                info!("{}", code);
                info!("Waiting for QR code scan...");
            }
            TransportEvent::Authenticated => {
                info!("WhatsApp client authenticated successfully");
            }
            TransportEvent::AuthFailure(reason) => {
                error!("Authentication failed: {}", reason);
            }
            TransportEvent::Ready => {
                info!("WhatsApp client is ready!");
                // Announce once per process, after the session settles.
                if !welcome_scheduled {
                    welcome_scheduled = true;
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        tokio::time::sleep(state.ready_delay).await;
                        let report = state.broadcaster.run().await;
                        info!(
                            "Welcome broadcast finished: {} sent, {} skipped, {} failed",
                            report.sent, report.skipped, report.failed
                        );
                    });
                }
            }
            TransportEvent::Disconnected(reason) => {
                warn!("WhatsApp client disconnected: {}", reason);
            }
            TransportEvent::Message(message) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_message(&state, message).await;
                });
            }
        }
    }

    Ok(())
}

async fn handle_message(state: &AppState, message: InboundMessage) {
    let Some(reply) = state.process_message(&message).await else {
        return;
    };

    // The sender gets no reply when delivery fails; the error is only logged.
    if let Err(e) = state.delivery.deliver(&message.sender_id, &reply.text).await {
        error!(
            "Error handling {} message from {} ({}): {:#}",
            reply.kind,
            message.sender_id,
            truncate_for_log(&message.text, 50),
            e
        );
    }
}

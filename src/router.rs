use tracing::{error, info};

use crate::api::{ApiClient, SearchHit};
use crate::command::Command;

const MAX_SEARCH_RESULTS: usize = 3;

pub const HELP_TEXT: &str = "Available commands:

🌤️ /weather [location] - Get weather information
🔤 /translate [text] - Translate text to English
🔍 /search [query] - Search for information
❓ /help - Show this help message

You can also send me any message and I'll try to help!";

const TRANSLATE_FALLBACK: &str = "Sorry, I couldn't translate that text. Please try again.";
const CHAT_EMPTY_REPLY: &str = "I received your message but couldn't generate a response.";
const CHAT_FALLBACK: &str =
    "I received your message. How can I help you? Try sending /help for available commands.";

/// Turns commands into reply text by calling the external API.
///
/// Every API failure is logged and converted into an apology for the user,
/// so `dispatch` always produces a reply.
pub struct CommandRouter {
    api: ApiClient,
}

impl CommandRouter {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn dispatch(&self, command: &Command) -> String {
        info!("Dispatching {} command", command);
        match command {
            Command::Weather { location } => self.weather(location).await,
            Command::Translate { text } => self.translate(text).await,
            Command::Search { query } => self.search(query).await,
            Command::Help => HELP_TEXT.to_string(),
            Command::Generic { text } => self.generic(text).await,
        }
    }

    async fn weather(&self, location: &str) -> String {
        match self.api.weather(location).await {
            Ok(report) => format!(
                "Weather in {}: {}, {}°C",
                location, report.description, report.temperature
            ),
            Err(e) => {
                error!("Weather API error for '{}': {:#}", location, e);
                format!(
                    "Sorry, I couldn't get weather information for {}. Please try again.",
                    location
                )
            }
        }
    }

    async fn translate(&self, text: &str) -> String {
        match self.api.translate(text).await {
            Ok(translation) => format!("Translation: {}", translation.translated_text),
            Err(e) => {
                error!("Translation API error: {:#}", e);
                TRANSLATE_FALLBACK.to_string()
            }
        }
    }

    async fn search(&self, query: &str) -> String {
        match self.api.search(query).await {
            Ok(hits) => format_search_results(query, &hits),
            Err(e) => {
                error!("Search API error for '{}': {:#}", query, e);
                format!("Sorry, I couldn't search for \"{}\". Please try again.", query)
            }
        }
    }

    async fn generic(&self, text: &str) -> String {
        match self.api.chat(text).await {
            Ok(reply) => reply
                .response
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| CHAT_EMPTY_REPLY.to_string()),
            Err(e) => {
                error!("Generic API error: {:#}", e);
                CHAT_FALLBACK.to_string()
            }
        }
    }
}

fn format_search_results(query: &str, hits: &[SearchHit]) -> String {
    let mut message = format!("Search results for \"{}\":\n\n", query);
    for (index, hit) in hits.iter().take(MAX_SEARCH_RESULTS).enumerate() {
        message.push_str(&format!(
            "{}. {}\n{}\n\n",
            index + 1,
            hit.title,
            hit.description
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    fn router(base_url: String, timeout_secs: u64) -> CommandRouter {
        router_with_timeouts(base_url, timeout_secs, timeout_secs)
    }

    fn router_with_timeouts(base_url: String, request_secs: u64, chat_secs: u64) -> CommandRouter {
        CommandRouter::new(ApiClient::new(ApiConfig {
            base_url,
            api_key: "k".to_string(),
            request_timeout_secs: request_secs,
            chat_timeout_secs: chat_secs,
        }))
    }

    /// Stub API whose weather and chat endpoints both answer after 2 s
    fn slow_app() -> Router {
        Router::new()
            .route(
                "/weather",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({"description": "slow", "temperature": 1}))
                }),
            )
            .route(
                "/chat",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({"response": "slow ok"}))
                }),
            )
    }

    /// A base URL nothing listens on
    async fn dead_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    fn weather(location: &str) -> Command {
        Command::Weather {
            location: location.to_string(),
        }
    }

    #[tokio::test]
    async fn test_weather_success() {
        let app = Router::new().route(
            "/weather",
            get(|| async { Json(json!({"description": "clear sky", "temperature": 21})) }),
        );
        let router = router(serve(app).await, 10);

        assert_eq!(
            router.dispatch(&weather("Oslo")).await,
            "Weather in Oslo: clear sky, 21°C"
        );
    }

    #[tokio::test]
    async fn test_weather_temperature_as_string() {
        let app = Router::new().route(
            "/weather",
            get(|| async { Json(json!({"description": "sunny", "temperature": "21"})) }),
        );
        let router = router(serve(app).await, 10);

        assert_eq!(
            router.dispatch(&weather("Oslo")).await,
            "Weather in Oslo: sunny, 21°C"
        );
    }

    #[tokio::test]
    async fn test_weather_timeout_returns_apology() {
        let app = Router::new().route(
            "/weather",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"description": "late", "temperature": 0}))
            }),
        );
        let router = router(serve(app).await, 1);

        assert_eq!(
            router.dispatch(&weather("Oslo")).await,
            "Sorry, I couldn't get weather information for Oslo. Please try again."
        );
    }

    #[tokio::test]
    async fn test_generic_chat_gets_longer_timeout() {
        let router = router_with_timeouts(serve(slow_app()).await, 1, 4);

        let reply = router
            .dispatch(&Command::Generic {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(reply, "slow ok");
    }

    #[tokio::test]
    async fn test_classified_command_uses_request_timeout() {
        let router = router_with_timeouts(serve(slow_app()).await, 1, 4);

        assert_eq!(
            router.dispatch(&weather("Oslo")).await,
            "Sorry, I couldn't get weather information for Oslo. Please try again."
        );
    }

    #[tokio::test]
    async fn test_every_branch_survives_unreachable_api() {
        let router = router(dead_url().await, 10);

        assert_eq!(
            router.dispatch(&weather("Oslo")).await,
            "Sorry, I couldn't get weather information for Oslo. Please try again."
        );
        assert_eq!(
            router
                .dispatch(&Command::Translate {
                    text: "hola".to_string()
                })
                .await,
            TRANSLATE_FALLBACK
        );
        assert_eq!(
            router
                .dispatch(&Command::Search {
                    query: "rust".to_string()
                })
                .await,
            "Sorry, I couldn't search for \"rust\". Please try again."
        );
        assert_eq!(
            router
                .dispatch(&Command::Generic {
                    text: "hi".to_string()
                })
                .await,
            CHAT_FALLBACK
        );
    }

    #[tokio::test]
    async fn test_help_needs_no_network() {
        let router = router(dead_url().await, 10);
        let reply = router.dispatch(&Command::Help).await;
        assert!(reply.starts_with("Available commands:"));
        assert!(reply.contains("/weather [location]"));
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn test_translate_success() {
        let app = Router::new().route(
            "/translate",
            post(|| async { Json(json!({"translated_text": "hello world"})) }),
        );
        let router = router(serve(app).await, 10);

        let reply = router
            .dispatch(&Command::Translate {
                text: "hola mundo".to_string(),
            })
            .await;
        assert_eq!(reply, "Translation: hello world");
    }

    #[tokio::test]
    async fn test_search_lists_at_most_three_results() {
        let app = Router::new().route(
            "/search",
            get(|| async {
                Json(json!({"results": [
                    {"title": "One", "description": "first"},
                    {"title": "Two", "description": "second"},
                    {"title": "Three", "description": "third"},
                    {"title": "Four", "description": "fourth"}
                ]}))
            }),
        );
        let router = router(serve(app).await, 10);

        let reply = router
            .dispatch(&Command::Search {
                query: "numbers".to_string(),
            })
            .await;
        assert_eq!(
            reply,
            "Search results for \"numbers\":\n\n\
             1. One\nfirst\n\n\
             2. Two\nsecond\n\n\
             3. Three\nthird\n\n"
        );
    }

    #[tokio::test]
    async fn test_generic_uses_response_field() {
        let app = Router::new().route(
            "/chat",
            post(|| async { Json(json!({"response": "Hi there!"})) }),
        );
        let router = router(serve(app).await, 10);

        let reply = router
            .dispatch(&Command::Generic {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_generic_without_response_field() {
        let app = Router::new().route("/chat", post(|| async { Json(json!({"status": "ok"})) }));
        let router = router(serve(app).await, 10);

        let reply = router
            .dispatch(&Command::Generic {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(reply, CHAT_EMPTY_REPLY);
    }
}

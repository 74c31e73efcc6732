use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;

#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub description: String,
    /// Temperature as the API rendered it, without unit
    pub temperature: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    description: String,
    temperature: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    pub translated_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    target_language: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Client for the external HTTP API backing the bot commands
pub struct ApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.config.chat_timeout_secs)
    }

    /// GET /weather?location=..&key=..
    pub async fn weather(&self, location: &str) -> Result<WeatherReport> {
        let url = self.url("weather");
        debug!("Requesting weather for '{}' from {}", location, url);

        let request = self
            .client
            .get(&url)
            .query(&[("location", location), ("key", self.config.api_key.as_str())])
            .timeout(self.request_timeout());

        let response: WeatherResponse = send_json(request, "weather").await?;
        let temperature = match response.temperature {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s,
            other => anyhow::bail!("weather response has unusable temperature: {}", other),
        };

        Ok(WeatherReport {
            description: response.description,
            temperature,
        })
    }

    /// POST /translate, always into English
    pub async fn translate(&self, text: &str) -> Result<Translation> {
        let url = self.url("translate");
        debug!("Requesting translation from {}", url);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&TranslateRequest {
                text,
                target_language: "en",
            })
            .timeout(self.request_timeout());

        send_json(request, "translate").await
    }

    /// GET /search?q=..&api_key=..
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = self.url("search");
        debug!("Searching '{}' via {}", query, url);

        let request = self
            .client
            .get(&url)
            .query(&[("q", query), ("api_key", self.config.api_key.as_str())])
            .timeout(self.request_timeout());

        let response: SearchResponse = send_json(request, "search").await?;
        Ok(response.results)
    }

    /// POST /chat with free text
    pub async fn chat(&self, message: &str) -> Result<ChatReply> {
        let url = self.url("chat");
        debug!("Sending generic chat request to {}", url);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest { message })
            .timeout(self.chat_timeout());

        send_json(request, "chat").await
    }
}

async fn send_json<T>(request: reqwest::RequestBuilder, endpoint: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", endpoint))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} API error ({}): {}", endpoint, status, error_body);
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", endpoint))
}

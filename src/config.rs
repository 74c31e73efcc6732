use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::admission::{AdminAllowList, AdmissionMode};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Raw mode name; resolved once via [`Config::admission_mode`]
    #[serde(default = "default_response_mode")]
    pub response_mode: String,
    #[serde(default)]
    pub admin_numbers: Vec<String>,
    /// Welcome recipients; falls back to `admin_numbers` when unset
    #[serde(default)]
    pub broadcast_numbers: Option<Vec<String>>,
    #[serde(default)]
    pub send_welcome_to_self: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Pause between the first `ready` and the welcome broadcast
    #[serde(default = "default_ready_delay_secs")]
    pub ready_delay_secs: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Send attempts per reply, including the first
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
}

fn default_bot_name() -> String {
    "WhatsApp API Bot".to_string()
}

fn default_response_mode() -> String {
    "admin_only".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_chat_timeout_secs() -> u64 {
    15
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

fn default_ready_delay_secs() -> u64 {
    3
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_send_attempts() -> u32 {
    3
}

fn default_port() -> u16 {
    3000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            response_mode: default_response_mode(),
            admin_numbers: Vec::new(),
            broadcast_numbers: None,
            send_welcome_to_self: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
        }
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            ready_delay_secs: default_ready_delay_secs(),
            connect_attempts: default_connect_attempts(),
            send_attempts: default_send_attempts(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
        }
    }
}

/// Split a comma-separated env value, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Admission mode resolved from `bot.response_mode`.
    pub fn admission_mode(&self) -> AdmissionMode {
        AdmissionMode::from_config(&self.bot.response_mode)
    }

    pub fn admin_allow_list(&self) -> AdminAllowList {
        AdminAllowList::new(&self.bot.admin_numbers)
    }

    /// Recipients of the startup announcement.
    pub fn broadcast_recipients(&self) -> Vec<String> {
        self.bot
            .broadcast_numbers
            .clone()
            .unwrap_or_else(|| self.bot.admin_numbers.clone())
    }

    /// Load the TOML file (all defaults when it does not exist), then apply
    /// process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Override file values with environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("BOT_NAME") {
            self.bot.name = name;
        }
        if let Some(mode) = lookup("BOT_RESPONSE_MODE") {
            self.bot.response_mode = mode;
        }
        if let Some(numbers) = lookup("ADMIN_NUMBERS") {
            self.bot.admin_numbers = split_list(&numbers);
        }
        if let Some(numbers) = lookup("BROADCAST_NUMBERS") {
            self.bot.broadcast_numbers = Some(split_list(&numbers));
        }
        if let Some(flag) = lookup("SEND_WELCOME_TO_SELF") {
            self.bot.send_welcome_to_self = flag.trim() == "true";
        }
        if let Some(url) = lookup("EXTERNAL_API_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = lookup("EXTERNAL_API_KEY") {
            self.api.api_key = key;
        }
        if let Some(url) = lookup("WHATSAPP_BRIDGE_URL") {
            self.whatsapp.bridge_url = url;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = PathBuf::from(dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bot.name, "WhatsApp API Bot");
        assert_eq!(config.admission_mode(), AdmissionMode::AdminOnly);
        assert_eq!(config.api.request_timeout_secs, 10);
        assert_eq!(config.api.chat_timeout_secs, 15);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.whatsapp.ready_delay_secs, 3);
        assert_eq!(config.whatsapp.send_attempts, 3);
        assert!(config.admin_allow_list().is_empty());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = Config::parse(
            r#"
            [bot]
            name = "Relay"
            response_mode = "command_only"
            admin_numbers = ["+1 555-0100", "+44 20 7946 0000"]

            [api]
            base_url = "https://api.example.com"
            api_key = "secret"

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.bot.name, "Relay");
        assert_eq!(config.admission_mode(), AdmissionMode::CommandOnly);
        assert_eq!(config.admin_allow_list().len(), 2);
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.chat_timeout_secs, 15);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.whatsapp.bridge_url, "ws://127.0.0.1:3001");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::parse("[bot\nname = 1").is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::parse("[bot]\nresponse_mode = \"all\"\n").unwrap();
        config
            .apply_env(env(&[
                ("BOT_RESPONSE_MODE", "direct_messages_only"),
                ("ADMIN_NUMBERS", " +1 555-0100, ,+15550101 "),
                ("EXTERNAL_API_URL", "http://localhost:9000"),
                ("SEND_WELCOME_TO_SELF", "true"),
                ("PORT", "4000"),
            ]))
            .unwrap();

        assert_eq!(config.admission_mode(), AdmissionMode::DirectOnly);
        assert_eq!(config.bot.admin_numbers, vec!["+1 555-0100", "+15550101"]);
        assert_eq!(config.api.base_url, "http://localhost:9000");
        assert!(config.bot.send_welcome_to_self);
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_invalid_port_is_error() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("PORT", "abc")])).is_err());
    }

    #[test]
    fn test_broadcast_recipients_fall_back_to_admins() {
        let mut config = Config::default();
        config.bot.admin_numbers = vec!["+15550100".to_string()];
        assert_eq!(config.broadcast_recipients(), vec!["+15550100"]);

        config
            .apply_env(env(&[("BROADCAST_NUMBERS", "+15550111,+15550122")]))
            .unwrap();
        assert_eq!(config.broadcast_recipients(), vec!["+15550111", "+15550122"]);
    }

    #[test]
    fn test_unknown_mode_resolves_to_admin_only() {
        let mut config = Config::default();
        config.apply_env(env(&[("BOT_RESPONSE_MODE", "open")])).unwrap();
        assert_eq!(config.admission_mode(), AdmissionMode::AdminOnly);
    }
}

use std::fmt;

/// A classified user intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Weather { location: String },
    Translate { text: String },
    Search { query: String },
    Help,
    Generic { text: String },
}

impl Command {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Weather { .. } => "weather",
            Command::Translate { .. } => "translate",
            Command::Search { .. } => "search",
            Command::Help => "help",
            Command::Generic { .. } => "generic",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Classify message text into a command.
///
/// Keyword matching is case-insensitive and checked in a fixed order
/// (weather, translate, search, help); the first match wins and anything
/// else is `Generic`. Extracted arguments keep the sender's casing.
pub fn classify(text: &str) -> Command {
    let trimmed = text.trim();
    // ASCII lowercasing keeps byte offsets aligned with `trimmed`.
    let lower = trimmed.to_ascii_lowercase();

    if lower.contains("weather") {
        let without_command = remove_first_ignore_case(trimmed, "/weather");
        let location = remove_first_ignore_case(&without_command, "weather");
        return Command::Weather {
            location: location.trim().to_string(),
        };
    }

    if lower.starts_with("/translate") {
        let words: Vec<&str> = trimmed.split_whitespace().skip(1).collect();
        return Command::Translate {
            text: words.join(" "),
        };
    }

    if lower.starts_with("/search") {
        return Command::Search {
            query: trimmed["/search".len()..].trim().to_string(),
        };
    }

    if lower == "/help" || lower.contains("help") {
        return Command::Help;
    }

    Command::Generic {
        text: text.to_string(),
    }
}

/// Remove the first ASCII case-insensitive occurrence of `needle`.
fn remove_first_ignore_case(haystack: &str, needle: &str) -> String {
    let lower = haystack.to_ascii_lowercase();
    match lower.find(needle) {
        Some(idx) => format!("{}{}", &haystack[..idx], &haystack[idx + needle.len()..]),
        None => haystack.to_string(),
    }
}

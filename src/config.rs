use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrictnessMode {
    /// Text must start with the instrument and carry a directional keyword after it.
    #[default]
    Strict,
    /// Any whole-word directional keyword is enough.
    Loose,
}

impl std::fmt::Display for StrictnessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrictnessMode::Strict => write!(f, "strict"),
            StrictnessMode::Loose => write!(f, "loose"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub price: PriceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chats to watch: numeric ids or usernames (with or without `@`).
    pub source_chats: Vec<String>,
    /// Users allowed to subscribe. Empty means anyone.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
    /// Recipients added to the store on every startup.
    #[serde(default)]
    pub initial_subscribers: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mode: StrictnessMode,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            keywords: default_keywords(),
            mode: StrictnessMode::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_price_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

/// Upper bound for `reconciler.retention_hours` (ten years).
pub const MAX_RETENTION_HOURS: u64 = 87_600;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReconcilerConfig {
    /// Forget tracked signals not seen for this many hours. Unset keeps them forever.
    #[serde(default)]
    pub retention_hours: Option<u64>,
}

fn default_instrument() -> String {
    "XAUUSD".to_string()
}

fn default_keywords() -> Vec<String> {
    vec!["buy".to_string(), "sell".to_string()]
}

fn default_price_base_url() -> String {
    "https://www.goldapi.io/api".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_db_path() -> PathBuf {
    PathBuf::from("subscribers.db")
}

/// Parsed form of `telegram.source_chats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceChats {
    ids: Vec<i64>,
    usernames: Vec<String>,
}

impl SourceChats {
    pub fn parse(entries: &[String]) -> Self {
        let mut chats = Self::default();
        for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            match entry.parse::<i64>() {
                Ok(id) => chats.ids.push(id),
                Err(_) => chats
                    .usernames
                    .push(entry.trim_start_matches('@').to_lowercase()),
            }
        }
        chats
    }

    pub fn matches(&self, chat_id: i64, username: Option<&str>) -> bool {
        if self.ids.contains(&chat_id) {
            return true;
        }
        username.is_some_and(|name| {
            let name = name.trim_start_matches('@').to_lowercase();
            self.usernames.iter().any(|u| *u == name)
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len() + self.usernames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Config {
    pub fn source_chats(&self) -> SourceChats {
        SourceChats::parse(&self.telegram.source_chats)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate config text. Empty secrets fall back to
    /// `BOT_TOKEN` and `GOLD_API_KEY` from the environment.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        if config.telegram.bot_token.trim().is_empty() {
            config.telegram.bot_token = std::env::var("BOT_TOKEN").unwrap_or_default();
        }
        if config.price.api_key.trim().is_empty() {
            config.price.api_key = std::env::var("GOLD_API_KEY").unwrap_or_default();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is missing (set it in the config or BOT_TOKEN)");
        }
        if self.source_chats().is_empty() {
            anyhow::bail!("telegram.source_chats must name at least one chat");
        }
        if self.classifier.instrument.trim().is_empty() {
            anyhow::bail!("classifier.instrument must not be empty");
        }
        if self.classifier.keywords.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("classifier.keywords must contain at least one keyword");
        }
        if self.price.api_key.trim().is_empty() {
            anyhow::bail!("price.api_key is missing (set it in the config or GOLD_API_KEY)");
        }
        if let Some(hours) = self.reconciler.retention_hours {
            if hours == 0 || hours > MAX_RETENTION_HOURS {
                anyhow::bail!(
                    "reconciler.retention_hours must be between 1 and {}, got {}",
                    MAX_RETENTION_HOURS,
                    hours
                );
            }
        }
        Ok(())
    }
}

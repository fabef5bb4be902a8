use serde::Deserialize;
use std::env;
use teloxide::types::{ChatId, Recipient};
use tracing::warn;

use crate::error::{RedistError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub listings: ListingsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub admin_user_ids: Vec<u64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: "@Sustainability_Redistribution".to_string(),
            admin_user_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Firebase,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub firebase_url: String,
    pub firebase_auth: Option<String>,
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Firebase,
            firebase_url: String::new(),
            firebase_auth: None,
            sqlite_path: "redistribution.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ListingsConfig {
    pub max_age_days: u32,
    pub sweep_interval_secs: u64,
    pub max_conflict_retries: u32,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            max_age_days: 14,
            sweep_interval_secs: 0,
            max_conflict_retries: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 10000,
        }
    }
}

impl Config {
    /// Loads `path` (optional), then `REDIST_*` variables, then the plain
    /// deployment variables (`BOT_TOKEN`, `CHANNEL_ID`, ...), later layers winning.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let admin_ids = env::var("ADMIN_USER_IDS").ok().map(|raw| {
            parse_id_list(&raw)
                .into_iter()
                .map(|id| id as i64)
                .collect::<Vec<i64>>()
        });
        let port = env::var("PORT").ok().and_then(|p| p.trim().parse::<i64>().ok());

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REDIST")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("telegram.admin_user_ids")
                    .try_parsing(true),
            )
            .set_override_option("telegram.bot_token", env::var("BOT_TOKEN").ok())?
            .set_override_option("telegram.channel_id", env::var("CHANNEL_ID").ok())?
            .set_override_option("telegram.admin_user_ids", admin_ids)?
            .set_override_option("storage.firebase_url", env::var("FIREBASE_DB_URL").ok())?
            .set_override_option("storage.firebase_auth", env::var("FIREBASE_AUTH").ok())?
            .set_override_option("server.port", port)?
            .build()?;

        let config: Config = config.try_deserialize()?;
        if config.telegram.admin_user_ids.is_empty() {
            warn!("No admin user ids configured, /admin and admin buttons will be inaccessible");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(RedistError::Config("telegram.bot_token (BOT_TOKEN) is not set".to_string()));
        }
        if self.storage.backend == StorageBackend::Firebase && self.storage.firebase_url.trim().is_empty() {
            return Err(RedistError::Config(
                "storage.firebase_url (FIREBASE_DB_URL) is not set".to_string(),
            ));
        }
        if self.listings.max_conflict_retries == 0 {
            return Err(RedistError::Config(
                "listings.max_conflict_retries must be at least 1".to_string(),
            ));
        }
        self.channel_recipient()?;
        Ok(())
    }

    pub fn channel_recipient(&self) -> Result<Recipient> {
        let raw = self.telegram.channel_id.trim();
        if raw.starts_with('@') {
            return Ok(Recipient::ChannelUsername(raw.to_string()));
        }
        raw.parse::<i64>()
            .map(|id| Recipient::Id(ChatId(id)))
            .map_err(|_| RedistError::Config(format!("Invalid channel id: {}", raw)))
    }

    /// Public `@username` of the channel without the `@`, if it has one.
    pub fn channel_username(&self) -> Option<&str> {
        self.telegram.channel_id.trim().strip_prefix('@')
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.telegram.admin_user_ids.contains(&user_id)
    }

    pub fn max_listing_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.listings.max_age_days))
    }
}

/// Comma separated ids; anything that isn't a plain number is dropped.
pub fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".to_string();
        config.storage.firebase_url = "https://example.firebaseio.com".to_string();
        config
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("12345, 67890"), vec![12345, 67890]);
        assert_eq!(parse_id_list(" 1,abc,,-4, 2 "), vec![1, 2]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut no_token = valid();
        no_token.telegram.bot_token = " ".to_string();
        assert!(matches!(no_token.validate(), Err(RedistError::Config(_))));

        let mut no_url = valid();
        no_url.storage.firebase_url.clear();
        assert!(no_url.validate().is_err());

        no_url.storage.backend = StorageBackend::Sqlite;
        assert!(no_url.validate().is_ok());
    }

    #[test]
    fn test_channel_recipient() {
        let mut config = valid();
        assert_eq!(config.channel_username(), Some("Sustainability_Redistribution"));
        assert!(matches!(
            config.channel_recipient().unwrap(),
            Recipient::ChannelUsername(ref name) if name == "@Sustainability_Redistribution"
        ));

        config.telegram.channel_id = "-1001234567890".to_string();
        assert_eq!(config.channel_username(), None);
        assert!(matches!(
            config.channel_recipient().unwrap(),
            Recipient::Id(ChatId(-1001234567890))
        ));

        config.telegram.channel_id = "not-a-channel".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_prefixed_environment() {
        env::set_var("REDIST_TELEGRAM__BOT_TOKEN", "from-redist-env");
        env::set_var("REDIST_TELEGRAM__ADMIN_USER_IDS", "11,22");
        env::set_var("REDIST_LISTINGS__MAX_AGE_DAYS", "3");

        let loaded = Config::load("/nonexistent/redist-config");

        env::remove_var("REDIST_TELEGRAM__BOT_TOKEN");
        env::remove_var("REDIST_TELEGRAM__ADMIN_USER_IDS");
        env::remove_var("REDIST_LISTINGS__MAX_AGE_DAYS");

        let config = loaded.unwrap();
        if env::var("BOT_TOKEN").is_err() {
            assert_eq!(config.telegram.bot_token, "from-redist-env");
        }
        if env::var("ADMIN_USER_IDS").is_err() {
            assert_eq!(config.telegram.admin_user_ids, vec![11, 22]);
        }
        assert_eq!(config.listings.max_age_days, 3);
    }

    #[test]
    fn test_is_admin() {
        let mut config = valid();
        config.telegram.admin_user_ids = vec![42];
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use poise::serenity_prelude::ChannelId;

/// Per-guild settings for activity tracking
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuildConfig {
    /// Voice channel where presence accrues afk minutes instead of
    /// connected minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub afk_channel: Option<u64>,

    /// Channel receiving level-up announcements; none disables them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement_channel: Option<u64>,

    /// XP awarded per counted message
    #[serde(default = "default_xp_per_message")]
    pub xp_per_message: u64,
}

fn default_xp_per_message() -> u64 {
    50
}

/// Bot configuration, one entry per guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Schema version
    pub version: u32,

    /// Guild ID (as string) -> settings
    pub guilds: HashMap<String, GuildConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            version: 1,
            guilds: HashMap::new(),
        }
    }
}

impl BotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> crate::error::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| crate::error::BotError::ConfigParse {
                    path: path.to_string(),
                    source: e,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(crate::error::BotError::ConfigLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.to_string(),
                source: e,
            }
        })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.to_string(),
                source: e,
            }
        })?;

        Ok(())
    }

    /// Get guild settings (read-only)
    pub fn guild(&self, guild_id: &str) -> Option<&GuildConfig> {
        self.guilds.get(guild_id)
    }

    /// Get or create guild settings
    pub fn guild_mut(&mut self, guild_id: &str) -> &mut GuildConfig {
        self.guilds.entry(guild_id.to_string()).or_default()
    }

    /// Away channel for a guild, if configured
    pub fn afk_channel(&self, guild_id: &str) -> Option<ChannelId> {
        self.guild(guild_id)
            .and_then(|g| g.afk_channel)
            .map(ChannelId::new)
    }

    /// Announcement channel for a guild, if configured
    pub fn announcement_channel(&self, guild_id: &str) -> Option<ChannelId> {
        self.guild(guild_id)
            .and_then(|g| g.announcement_channel)
            .map(ChannelId::new)
    }

    /// XP per message for a guild (default when unconfigured)
    pub fn xp_per_message(&self, guild_id: &str) -> u64 {
        self.guild(guild_id)
            .map(|g| g.xp_per_message)
            .unwrap_or_else(default_xp_per_message)
    }
}

/// Shared bot config type
pub type SharedBotConfig = Arc<tokio::sync::RwLock<BotConfig>>;

pub fn create_shared_bot_config(config: BotConfig) -> SharedBotConfig {
    Arc::new(tokio::sync::RwLock::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_per_message_defaults() {
        let json = r#"{
            "version": 1,
            "guilds": {
                "123": { "afk_channel": 456 }
            }
        }"#;

        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.xp_per_message("123"), 50);
        assert_eq!(config.xp_per_message("unknown"), 50);
        assert_eq!(config.afk_channel("123"), Some(ChannelId::new(456)));
        assert_eq!(config.announcement_channel("123"), None);
    }

    #[test]
    fn test_guild_mut_creates_entry() {
        let mut config = BotConfig::new();
        config.guild_mut("1").afk_channel = Some(99);
        assert_eq!(config.afk_channel("1"), Some(ChannelId::new(99)));
    }
}

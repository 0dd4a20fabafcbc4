use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SharedBotConfig;
use crate::store::ActivityKind;

/// Sink for level-up announcements.
///
/// Fire-and-forget: called at most once per crediting event, never retried.
#[async_trait]
pub trait LevelUpNotifier: Send + Sync {
    async fn notify_level_up(
        &self,
        guild: serenity::GuildId,
        member: serenity::UserId,
        kind: ActivityKind,
        new_level: u32,
    );
}

/// Posts announcements to the guild's configured announcement channel
pub struct ChannelNotifier {
    http: Arc<serenity::Http>,
    config: SharedBotConfig,
}

impl ChannelNotifier {
    pub fn new(http: Arc<serenity::Http>, config: SharedBotConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl LevelUpNotifier for ChannelNotifier {
    async fn notify_level_up(
        &self,
        guild: serenity::GuildId,
        member: serenity::UserId,
        kind: ActivityKind,
        new_level: u32,
    ) {
        let channel = {
            let config = self.config.read().await;
            config.announcement_channel(&guild.to_string())
        };

        let Some(channel) = channel else {
            debug!(
                "No announcement channel configured for guild {}, skipping level-up message",
                guild
            );
            return;
        };

        let activity = match kind {
            ActivityKind::Voice => "voice activity",
            ActivityKind::Text => "chatting",
        };

        let embed = serenity::CreateEmbed::new()
            .title("Level up!")
            .description(format!(
                "<@{}> reached level **{}** through {}",
                member, new_level, activity
            ))
            .color(0x2ecc71);

        let message = serenity::CreateMessage::new().embed(embed);
        if let Err(e) = channel.send_message(&self.http, message).await {
            warn!(
                "Failed to announce level-up for {} in guild {}: {}",
                member, guild, e
            );
        }
    }
}

/// Shared notifier handle
pub type SharedNotifier = Arc<dyn LevelUpNotifier>;

use poise::serenity_prelude as serenity;
use tracing::info;

use crate::store::{ActivityKind, ProfileStore, TextProfile};
use crate::{Data, Error};

/// Count a guild message toward the author's text profile
pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    // Ignore bot messages
    if msg.author.bot {
        return Ok(());
    }

    // DMs don't count toward any guild
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let guild = guild_id.to_string();
    let member_id = msg.author.id.to_string();

    let xp = {
        let config = data.config.read().await;
        config.xp_per_message(&guild)
    };

    let mut profile = data
        .store
        .get_text(&guild, &member_id)
        .await?
        .unwrap_or_else(|| TextProfile::new(&member_id, &msg.author.name));
    profile.name = msg.author.name.clone();

    let leveled_to = profile.credit_message(xp);
    data.store.upsert_text(&guild, profile).await?;

    if let Some(new_level) = leveled_to {
        info!(
            "Member {} reached text level {} in guild {}",
            member_id, new_level, guild
        );
        data.notifier
            .notify_level_up(guild_id, msg.author.id, ActivityKind::Text, new_level)
            .await;
    }

    data.store.rerank_text(&guild).await?;

    Ok(())
}

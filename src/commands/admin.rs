use poise::serenity_prelude as serenity;
use tracing::info;

use crate::error::BotError;
use crate::store::{Adjustment, ProfileStore, TextProfile};
use crate::tracker::Capability;
use crate::{Context, Error};

/// Capability of the invoking member, from their resolved permissions.
/// The tracker re-checks this and refuses to mutate anything without it.
async fn capability(ctx: &Context<'_>) -> Capability {
    match ctx.author_member().await.and_then(|m| m.permissions) {
        Some(p) if p.administrator() => Capability::Administrator,
        _ => Capability::Member,
    }
}

async fn reply_ephemeral(ctx: &Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

const REJECTION: &str = "You need administrator permissions for that; nothing was changed.";

/// Add connected minutes to a member's voice record
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn add_time(
    ctx: Context<'_>,
    #[description = "Member to credit"] member: serenity::User,
    #[description = "Minutes to add"]
    #[min = 1]
    minutes: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match ctx
        .data()
        .tracker
        .add_time(capability(&ctx).await, guild_id, member.id, &member.name, minutes)
        .await
    {
        Ok(profile) => {
            reply_ephemeral(
                &ctx,
                format!(
                    "Added {} min to {}: now {} min, level {}, rank #{}",
                    minutes, member.name, profile.minutes, profile.level, profile.rank
                ),
            )
            .await
        }
        Err(BotError::PermissionDenied { .. }) => reply_ephemeral(&ctx, REJECTION.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// Remove connected minutes from a member's voice record (floors at zero)
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn remove_time(
    ctx: Context<'_>,
    #[description = "Member to debit"] member: serenity::User,
    #[description = "Minutes to remove"]
    #[min = 1]
    minutes: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match ctx
        .data()
        .tracker
        .remove_time(capability(&ctx).await, guild_id, member.id, &member.name, minutes)
        .await
    {
        Ok(profile) => {
            reply_ephemeral(
                &ctx,
                format!(
                    "Removed {} min from {}: now {} min, level {}, rank #{}",
                    minutes, member.name, profile.minutes, profile.level, profile.rank
                ),
            )
            .await
        }
        Err(BotError::PermissionDenied { .. }) => reply_ephemeral(&ctx, REJECTION.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// Zero a member's voice record, keeping their row
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn reset_voice(
    ctx: Context<'_>,
    #[description = "Member to reset"] member: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match ctx
        .data()
        .tracker
        .reset(capability(&ctx).await, guild_id, member.id, &member.name)
        .await
    {
        Ok(()) => reply_ephemeral(&ctx, format!("Voice record of {} reset.", member.name)).await,
        Err(BotError::PermissionDenied { .. }) => reply_ephemeral(&ctx, REJECTION.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// Apply an XP adjustment the same way the tracker applies time adjustments:
/// refuse without the capability, audit, then re-rank.
async fn adjust_text(
    ctx: &Context<'_>,
    guild_id: serenity::GuildId,
    user: &serenity::User,
    adjustment: Adjustment,
) -> crate::error::Result<TextProfile> {
    if capability(ctx).await != Capability::Administrator {
        return Err(BotError::PermissionDenied {
            message: "administrator capability required".to_string(),
        });
    }

    let data = ctx.data();
    let guild = guild_id.to_string();
    let member_id = user.id.to_string();

    let mut profile = data
        .store
        .get_text(&guild, &member_id)
        .await?
        .unwrap_or_else(|| TextProfile::new(&member_id, &user.name));
    profile.adjust(adjustment);
    info!(
        "Manual XP adjustment {:?} for member {} in guild {} (now {} XP)",
        adjustment, member_id, guild, profile.xp
    );

    data.store.upsert_text(&guild, profile.clone()).await?;
    data.store.rerank_text(&guild).await?;

    Ok(data
        .store
        .get_text(&guild, &member_id)
        .await?
        .unwrap_or(profile))
}

/// Add XP to a member's text record
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn add_xp(
    ctx: Context<'_>,
    #[description = "Member to credit"] member: serenity::User,
    #[description = "XP to add"]
    #[min = 1]
    amount: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match adjust_text(&ctx, guild_id, &member, Adjustment::Add(amount)).await {
        Ok(profile) => {
            reply_ephemeral(
                &ctx,
                format!(
                    "Added {} XP to {}: now {} XP, level {}, rank #{}",
                    amount, member.name, profile.xp, profile.level, profile.rank
                ),
            )
            .await
        }
        Err(BotError::PermissionDenied { .. }) => reply_ephemeral(&ctx, REJECTION.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// Remove XP from a member's text record (floors at zero)
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn remove_xp(
    ctx: Context<'_>,
    #[description = "Member to debit"] member: serenity::User,
    #[description = "XP to remove"]
    #[min = 1]
    amount: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match adjust_text(&ctx, guild_id, &member, Adjustment::Remove(amount)).await {
        Ok(profile) => {
            reply_ephemeral(
                &ctx,
                format!(
                    "Removed {} XP from {}: now {} XP, level {}, rank #{}",
                    amount, member.name, profile.xp, profile.level, profile.rank
                ),
            )
            .await
        }
        Err(BotError::PermissionDenied { .. }) => reply_ephemeral(&ctx, REJECTION.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// Zero a member's text record, keeping their row
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn reset_xp(
    ctx: Context<'_>,
    #[description = "Member to reset"] member: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    if capability(&ctx).await != Capability::Administrator {
        return reply_ephemeral(&ctx, REJECTION.to_string()).await;
    }

    let data = ctx.data();
    let guild = guild_id.to_string();
    let member_id = member.id.to_string();

    let mut profile = data
        .store
        .get_text(&guild, &member_id)
        .await?
        .unwrap_or_else(|| TextProfile::new(&member_id, &member.name));
    profile.reset();
    data.store.upsert_text(&guild, profile).await?;
    data.store.rerank_text(&guild).await?;

    info!("Reset text record of member {} in guild {}", member_id, guild);
    reply_ephemeral(&ctx, format!("Text record of {} reset.", member.name)).await
}

/// Pick the voice channel whose presence counts as away time
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn set_afk_channel(
    ctx: Context<'_>,
    #[description = "Away voice channel (omit to clear)"]
    #[channel_types("Voice")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let data = ctx.data();

    {
        let mut config = data.config.write().await;
        config.guild_mut(&guild_id.to_string()).afk_channel = channel.as_ref().map(|c| c.id.get());
        config.save(&data.config_path).await?;
    }

    let message = match channel {
        Some(c) => format!("Away channel set to {}.", c.name),
        None => "Away channel cleared.".to_string(),
    };
    info!("Guild {}: {}", guild_id, message);
    reply_ephemeral(&ctx, message).await
}

/// Pick the channel receiving level-up announcements
#[poise::command(slash_command, guild_only, default_member_permissions = "ADMINISTRATOR")]
pub async fn set_announce_channel(
    ctx: Context<'_>,
    #[description = "Announcement channel (omit to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let data = ctx.data();

    {
        let mut config = data.config.write().await;
        config.guild_mut(&guild_id.to_string()).announcement_channel =
            channel.as_ref().map(|c| c.id.get());
        config.save(&data.config_path).await?;
    }

    let message = match channel {
        Some(c) => format!("Level-up announcements go to {}.", c.name),
        None => "Level-up announcements disabled.".to_string(),
    };
    info!("Guild {}: {}", guild_id, message);
    reply_ephemeral(&ctx, message).await
}

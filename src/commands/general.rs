use poise::serenity_prelude as serenity;
use tracing::info;

use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(poise::CreateReply::default()
        .content("Pong! Bot is working!")
        .ephemeral(true))
        .await?;
    Ok(())
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let embed = serenity::CreateEmbed::new()
        .title("Bot Commands")
        .description("Available commands:")
        .field("/ping", "Check if the bot is running", false)
        .field("/rank", "Show your level, XP and voice time", false)
        .field("/leaderboard", "Top members by voice time or XP", false)
        .field("/add_time, /remove_time, /reset_voice", "Adjust a member's voice minutes (Admin)", false)
        .field("/add_xp, /remove_xp, /reset_xp", "Adjust a member's XP (Admin)", false)
        .field("/set_afk_channel", "Pick the voice channel that counts as away (Admin)", false)
        .field("/set_announce_channel", "Pick the channel for level-up messages (Admin)", false)
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}

use poise::serenity_prelude as serenity;
use tracing::info;

use crate::store::ProfileStore;
use crate::{Context, Error};

/// Total minutes formatted as hours and minutes
fn format_minutes(total: u64) -> String {
    format!("{}h {:02}min", total / 60, total % 60)
}

/// Show a member's level, XP and voice time
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "Member to look up (defaults to you)"] member: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let user = member.unwrap_or_else(|| ctx.author().clone());

    let guild = guild_id.to_string();
    let member_id = user.id.to_string();
    let data = ctx.data();

    let text = data.store.get_text(&guild, &member_id).await?;
    let voice = data.store.get_voice(&guild, &member_id).await?;

    if text.is_none() && voice.is_none() {
        ctx.send(
            poise::CreateReply::default()
                .content(format!("No activity recorded yet for {}.", user.name))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Stats for {}", user.name))
        .color(0x3498db);

    if let Some(profile) = text {
        let progress = profile.progress();
        embed = embed.field(
            "Chat",
            format!(
                "Level **{}** (rank #{})\n{} XP over {} messages\n{} XP to next level",
                progress.level, profile.rank, profile.xp, profile.messages, progress.to_next
            ),
            true,
        );
    }

    if let Some(profile) = voice {
        let progress = profile.progress();
        embed = embed.field(
            "Voice",
            format!(
                "Level **{}** (rank #{})\n{} connected, {} away\n{} min to next level",
                progress.level,
                profile.rank,
                format_minutes(profile.minutes),
                format_minutes(profile.afk_minutes),
                progress.to_next
            ),
            true,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Which leaderboard to show
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum LeaderboardKind {
    #[name = "voice"]
    Voice,
    #[name = "text"]
    Text,
}

/// Top members by voice time or XP
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Ranking to show (defaults to voice)"] kind: Option<LeaderboardKind>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let kind = kind.unwrap_or(LeaderboardKind::Voice);
    info!(
        "Leaderboard ({:?}) requested by {} in guild {}",
        kind,
        ctx.author().name,
        guild_id
    );

    let guild = guild_id.to_string();
    let data = ctx.data();

    let (title, lines) = match kind {
        LeaderboardKind::Voice => {
            let top = data.store.top_voice(&guild, 10).await?;
            let lines: Vec<String> = top
                .iter()
                .map(|p| {
                    format!(
                        "**#{}** {} — {} (level {})",
                        p.rank,
                        p.name,
                        format_minutes(p.minutes),
                        p.level
                    )
                })
                .collect();
            ("Voice leaderboard", lines)
        }
        LeaderboardKind::Text => {
            let top = data.store.top_text(&guild, 10).await?;
            let lines: Vec<String> = top
                .iter()
                .map(|p| format!("**#{}** {} — {} XP (level {})", p.rank, p.name, p.xp, p.level))
                .collect();
            ("Chat leaderboard", lines)
        }
    };

    if lines.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("No activity recorded yet.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title(title)
        .description(lines.join("\n"))
        .color(0xf1c40f);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0h 00min");
        assert_eq!(format_minutes(59), "0h 59min");
        assert_eq!(format_minutes(125), "2h 05min");
    }
}

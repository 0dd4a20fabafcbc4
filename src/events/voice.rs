use poise::serenity_prelude as serenity;
use tracing::debug;

use crate::tracker::{ChannelOccupancy, Occupant, TransitionSnapshot, VoiceTransition};
use crate::{Data, Error};

/// Handle a gateway voice-state update.
///
/// Translates the serenity event into a transition plus occupancy snapshots
/// of the touched channels and hands it to the tracker. The cache is already
/// updated when the event is dispatched, so the snapshots describe the
/// after-transition state the tracker expects.
pub async fn handle_voice_state_update(
    ctx: &serenity::Context,
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
    data: &Data,
) -> Result<(), Error> {
    let Some(guild_id) = new.guild_id.or_else(|| old.and_then(|o| o.guild_id)) else {
        return Ok(());
    };

    // The bot's own connections and other bots never accrue time
    if new.member.as_ref().is_some_and(|m| m.user.bot) {
        return Ok(());
    }

    let old_channel = old.and_then(|o| o.channel_id);
    let new_channel = new.channel_id;
    if old_channel.is_none() && new_channel.is_none() {
        return Ok(());
    }

    let member_name = new
        .member
        .as_ref()
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| new.user_id.to_string());

    let snapshot = TransitionSnapshot {
        old_channel: old_channel.map(|c| channel_occupancy(ctx, guild_id, c)),
        new_channel: new_channel.map(|c| channel_occupancy(ctx, guild_id, c)),
    };

    let transition = VoiceTransition {
        guild: guild_id,
        member: new.user_id,
        old_channel,
        old_self_mute: old.map(|o| o.self_mute).unwrap_or(false),
        new_channel,
        new_self_mute: new.self_mute,
    };

    let afk_channel = {
        let config = data.config.read().await;
        config.afk_channel(&guild_id.to_string())
    };

    debug!(
        "Voice transition for {} in guild {}: {:?} -> {:?} (mute {} -> {})",
        new.user_id,
        guild_id,
        old_channel,
        new_channel,
        transition.old_self_mute,
        transition.new_self_mute
    );

    data.tracker
        .process_transition(transition, snapshot, afk_channel, &member_name)
        .await;

    Ok(())
}

/// Occupants of one voice channel, read from the guild cache
fn channel_occupancy(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
) -> ChannelOccupancy {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return ChannelOccupancy::default();
    };

    let occupants = guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(channel_id))
        .map(|vs| Occupant {
            member: vs.user_id,
            is_bot: guild
                .members
                .get(&vs.user_id)
                .map(|m| m.user.bot)
                .unwrap_or(false),
        })
        .collect();

    ChannelOccupancy::new(occupants)
}

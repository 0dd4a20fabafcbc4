use poise::serenity_prelude::{ChannelId, GuildId, UserId};

/// Identifies one member's presence within one guild.
///
/// Timers are keyed by this struct so independent guilds never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub guild: GuildId,
    pub member: UserId,
}

/// One voice-state transition as delivered by the gateway.
///
/// The tracker has no knowledge of why a transition happened beyond these
/// fields. Events for a given member arrive in occurrence order; ordering
/// across members is unconstrained.
#[derive(Debug, Clone, Copy)]
pub struct VoiceTransition {
    pub guild: GuildId,
    pub member: UserId,
    pub old_channel: Option<ChannelId>,
    pub old_self_mute: bool,
    pub new_channel: Option<ChannelId>,
    pub new_self_mute: bool,
}

/// One occupant of a voice channel
#[derive(Debug, Clone, Copy)]
pub struct Occupant {
    pub member: UserId,
    pub is_bot: bool,
}

/// After-transition occupancy of a single voice channel
#[derive(Debug, Clone, Default)]
pub struct ChannelOccupancy {
    pub occupants: Vec<Occupant>,
}

impl ChannelOccupancy {
    pub fn new(occupants: Vec<Occupant>) -> Self {
        Self { occupants }
    }

    /// Non-bot occupants
    pub fn humans(&self) -> impl Iterator<Item = UserId> + '_ {
        self.occupants
            .iter()
            .filter(|o| !o.is_bot)
            .map(|o| o.member)
    }

    pub fn human_count(&self) -> usize {
        self.humans().count()
    }
}

/// Occupancy of the channels touched by a transition, captured after the
/// transition took effect.
#[derive(Debug, Clone, Default)]
pub struct TransitionSnapshot {
    pub old_channel: Option<ChannelOccupancy>,
    pub new_channel: Option<ChannelOccupancy>,
}

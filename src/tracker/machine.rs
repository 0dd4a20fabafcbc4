//! Presence state machine.
//!
//! Pure core of the voice tracker: a map of per-member sessions advanced by
//! `apply`, which turns one gateway transition plus the after-transition
//! channel occupancy into credit effects. No Discord client, store, or clock
//! lives here; callers pass the current monotonic time in.

use std::collections::HashMap;

use poise::serenity_prelude::{ChannelId, GuildId, UserId};

use super::event::{ChannelOccupancy, SessionKey, TransitionSnapshot, VoiceTransition};

/// Timer state for one connected member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    /// Accruing connected minutes since the contained instant
    Active { since: u64 },
    /// In the away channel, accruing afk minutes
    Afk { since: u64 },
    /// Present but not accruing (muted, alone, or otherwise ineligible)
    Idle,
}

/// In-memory presence of one member.
///
/// Never persisted; a restart loses in-flight session time by design.
#[derive(Debug, Clone, Copy)]
struct VoiceSession {
    channel: ChannelId,
    self_mute: bool,
    timer: SessionTimer,
}

/// Minutes owed to an accumulator as the outcome of one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditEffect {
    pub key: SessionKey,
    pub kind: CreditKind,
    pub minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    /// Credited to accumulated connected minutes
    Connected,
    /// Credited to accumulated afk minutes
    Afk,
}

/// The tracker's session map. One instance per bot process; keys carry the
/// guild so independent communities never interfere.
#[derive(Debug, Default)]
pub struct PresenceMachine {
    sessions: HashMap<SessionKey, VoiceSession>,
}

impl PresenceMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members currently tracked as connected
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Advance the machine by one transition.
    ///
    /// `snapshot` must describe the touched channels as they look after the
    /// transition. Returns the credits to apply, possibly for members other
    /// than the one that moved (a departure can pause the remaining
    /// occupant, an arrival can resume a formerly lone one).
    pub fn apply(
        &mut self,
        t: &VoiceTransition,
        snapshot: &TransitionSnapshot,
        afk_channel: Option<ChannelId>,
        now: u64,
    ) -> Vec<CreditEffect> {
        let mut effects = Vec::new();
        let key = SessionKey {
            guild: t.guild,
            member: t.member,
        };

        match t.new_channel {
            None => self.disconnect(key, now, &mut effects),
            Some(dest) if afk_channel == Some(dest) => {
                self.enter_afk_channel(key, dest, t.new_self_mute, now, &mut effects)
            }
            Some(dest) => {
                let destination = snapshot.new_channel.as_ref();
                self.enter_real_channel(key, dest, t.new_self_mute, destination, now, &mut effects)
            }
        }

        // Departure side: the remaining occupant may now be alone.
        if let (Some(old), Some(occupancy)) = (t.old_channel, snapshot.old_channel.as_ref()) {
            if t.new_channel != Some(old) && afk_channel != Some(old) {
                self.pause_lone_human(t.guild, occupancy, now, &mut effects);
            }
        }

        // Arrival side: a formerly lone occupant becomes eligible again.
        if let (Some(new), Some(occupancy)) = (t.new_channel, snapshot.new_channel.as_ref()) {
            if t.old_channel != Some(new) && afk_channel != Some(new) {
                self.resume_joined_human(t.guild, new, t.member, occupancy, now);
            }
        }

        effects
    }

    /// Full disconnect: settle whichever timer was running and drop the
    /// session. A disconnect without a session is a no-op (duplicate event,
    /// or the process restarted mid-session).
    fn disconnect(&mut self, key: SessionKey, now: u64, effects: &mut Vec<CreditEffect>) {
        let Some(session) = self.sessions.remove(&key) else {
            return;
        };
        match session.timer {
            SessionTimer::Active { since } => effects.push(CreditEffect {
                key,
                kind: CreditKind::Connected,
                minutes: elapsed_minutes(since, now),
            }),
            SessionTimer::Afk { since } => effects.push(CreditEffect {
                key,
                kind: CreditKind::Afk,
                minutes: elapsed_minutes(since, now),
            }),
            SessionTimer::Idle => {}
        }
    }

    /// Entering the away channel: settle a running connected timer and run
    /// the afk timer instead. Mute state and population are irrelevant while
    /// away.
    fn enter_afk_channel(
        &mut self,
        key: SessionKey,
        dest: ChannelId,
        self_mute: bool,
        now: u64,
        effects: &mut Vec<CreditEffect>,
    ) {
        match self.sessions.get_mut(&key) {
            Some(session) if session.channel == dest => {
                // Already away; mute toggles have no timing effect here
                session.self_mute = self_mute;
                if !matches!(session.timer, SessionTimer::Afk { .. }) {
                    if let SessionTimer::Active { since } = session.timer {
                        effects.push(CreditEffect {
                            key,
                            kind: CreditKind::Connected,
                            minutes: elapsed_minutes(since, now),
                        });
                    }
                    session.timer = SessionTimer::Afk { since: now };
                }
            }
            Some(session) => {
                if let SessionTimer::Active { since } = session.timer {
                    effects.push(CreditEffect {
                        key,
                        kind: CreditKind::Connected,
                        minutes: elapsed_minutes(since, now),
                    });
                }
                *session = VoiceSession {
                    channel: dest,
                    self_mute,
                    timer: SessionTimer::Afk { since: now },
                };
            }
            None => {
                self.sessions.insert(
                    key,
                    VoiceSession {
                        channel: dest,
                        self_mute,
                        timer: SessionTimer::Afk { since: now },
                    },
                );
            }
        }
    }

    /// Joining or changing a real channel, or toggling mute inside one.
    /// Eligibility requires at least two humans in the destination and an
    /// unmuted member.
    fn enter_real_channel(
        &mut self,
        key: SessionKey,
        dest: ChannelId,
        self_mute: bool,
        destination: Option<&ChannelOccupancy>,
        now: u64,
        effects: &mut Vec<CreditEffect>,
    ) {
        let accompanied = destination.map(|o| o.human_count() >= 2).unwrap_or(false);

        match self.sessions.get_mut(&key) {
            Some(session) if session.channel == dest => {
                // Same channel: this is a mute toggle (or an unrelated flag
                // change, which must not restart a running timer)
                session.self_mute = self_mute;
                if self_mute {
                    if let SessionTimer::Active { since } = session.timer {
                        effects.push(CreditEffect {
                            key,
                            kind: CreditKind::Connected,
                            minutes: elapsed_minutes(since, now),
                        });
                        session.timer = SessionTimer::Idle;
                    }
                } else if session.timer == SessionTimer::Idle && accompanied {
                    session.timer = SessionTimer::Active { since: now };
                }
            }
            Some(session) => {
                // Channel change: settle the old timer, then evaluate the
                // destination as a fresh join
                match session.timer {
                    SessionTimer::Active { since } => effects.push(CreditEffect {
                        key,
                        kind: CreditKind::Connected,
                        minutes: elapsed_minutes(since, now),
                    }),
                    SessionTimer::Afk { since } => effects.push(CreditEffect {
                        key,
                        kind: CreditKind::Afk,
                        minutes: elapsed_minutes(since, now),
                    }),
                    SessionTimer::Idle => {}
                }
                *session = VoiceSession {
                    channel: dest,
                    self_mute,
                    timer: fresh_join_timer(accompanied, self_mute, now),
                };
            }
            None => {
                self.sessions.insert(
                    key,
                    VoiceSession {
                        channel: dest,
                        self_mute,
                        timer: fresh_join_timer(accompanied, self_mute, now),
                    },
                );
            }
        }
    }

    /// Farm guard: when exactly one human remains in a real channel, stop
    /// their timer and credit what they earned while accompanied.
    fn pause_lone_human(
        &mut self,
        guild: GuildId,
        occupancy: &ChannelOccupancy,
        now: u64,
        effects: &mut Vec<CreditEffect>,
    ) {
        let mut humans = occupancy.humans();
        let (Some(remaining), None) = (humans.next(), humans.next()) else {
            return;
        };

        let key = SessionKey {
            guild,
            member: remaining,
        };
        if let Some(session) = self.sessions.get_mut(&key) {
            if let SessionTimer::Active { since } = session.timer {
                effects.push(CreditEffect {
                    key,
                    kind: CreditKind::Connected,
                    minutes: elapsed_minutes(since, now),
                });
                session.timer = SessionTimer::Idle;
            }
        }
    }

    /// When a second human arrives, the member who was waiting alone starts
    /// accruing again (unless self-muted). Independent of the arriving
    /// member's own eligibility.
    fn resume_joined_human(
        &mut self,
        guild: GuildId,
        channel: ChannelId,
        mover: UserId,
        occupancy: &ChannelOccupancy,
        now: u64,
    ) {
        let humans: Vec<UserId> = occupancy.humans().collect();
        if humans.len() != 2 {
            return;
        }
        let Some(other) = humans.into_iter().find(|m| *m != mover) else {
            return;
        };

        let key = SessionKey {
            guild,
            member: other,
        };
        // A member connected before this process started has no session yet;
        // they are picked up here with their pre-restart time lost.
        let session = self.sessions.entry(key).or_insert(VoiceSession {
            channel,
            self_mute: false,
            timer: SessionTimer::Idle,
        });
        if !session.self_mute && session.timer == SessionTimer::Idle {
            session.timer = SessionTimer::Active { since: now };
        }
    }
}

fn fresh_join_timer(accompanied: bool, self_mute: bool, now: u64) -> SessionTimer {
    if accompanied && !self_mute {
        SessionTimer::Active { since: now }
    } else {
        SessionTimer::Idle
    }
}

/// Whole minutes elapsed between two monotonic readings
fn elapsed_minutes(since: u64, now: u64) -> u64 {
    now.saturating_sub(since) / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::event::Occupant;

    const GUILD: u64 = 10;
    const CH1: u64 = 100;
    const CH2: u64 = 200;
    const AFK: u64 = 900;

    fn key(member: u64) -> SessionKey {
        SessionKey {
            guild: GuildId::new(GUILD),
            member: UserId::new(member),
        }
    }

    fn occupancy(humans: &[u64], bots: &[u64]) -> ChannelOccupancy {
        let mut occupants: Vec<Occupant> = humans
            .iter()
            .map(|id| Occupant {
                member: UserId::new(*id),
                is_bot: false,
            })
            .collect();
        occupants.extend(bots.iter().map(|id| Occupant {
            member: UserId::new(*id),
            is_bot: true,
        }));
        ChannelOccupancy::new(occupants)
    }

    fn transition(
        member: u64,
        old: Option<u64>,
        old_mute: bool,
        new: Option<u64>,
        new_mute: bool,
    ) -> VoiceTransition {
        VoiceTransition {
            guild: GuildId::new(GUILD),
            member: UserId::new(member),
            old_channel: old.map(ChannelId::new),
            old_self_mute: old_mute,
            new_channel: new.map(ChannelId::new),
            new_self_mute: new_mute,
        }
    }

    fn snapshot(old: Option<ChannelOccupancy>, new: Option<ChannelOccupancy>) -> TransitionSnapshot {
        TransitionSnapshot {
            old_channel: old,
            new_channel: new,
        }
    }

    fn afk() -> Option<ChannelId> {
        Some(ChannelId::new(AFK))
    }

    fn connected(key: SessionKey, minutes: u64) -> CreditEffect {
        CreditEffect {
            key,
            kind: CreditKind::Connected,
            minutes,
        }
    }

    #[test]
    fn test_alone_accrues_nothing() {
        let mut machine = PresenceMachine::new();

        let fx = machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1], &[]))),
            afk(),
            0,
        );
        assert!(fx.is_empty());

        // Ten minutes alone, then disconnect: zero credit
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[], &[])), None),
            afk(),
            600,
        );
        assert!(fx.is_empty());
        assert_eq!(machine.session_count(), 0);
    }

    #[test]
    fn test_solo_period_uncounted_then_accrual_after_join() {
        let mut machine = PresenceMachine::new();

        // Member 1 waits alone for ten minutes
        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1], &[]))),
            afk(),
            0,
        );

        // Member 2 arrives at t=600: both timers start now
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1, 2], &[]))),
            afk(),
            600,
        );

        // Member 1 leaves three minutes later: credited exactly 3
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            780,
        );
        assert!(fx.contains(&connected(key(1), 3)));
        // Member 2 is now alone: their 3 accompanied minutes are settled too
        assert!(fx.contains(&connected(key(2), 3)));

        // Member 2's own later disconnect adds nothing
        let fx = machine.apply(
            &transition(2, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[], &[])), None),
            afk(),
            1200,
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_mute_guard() {
        let mut machine = PresenceMachine::new();
        let both = || occupancy(&[1, 2], &[]);

        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(both())),
            afk(),
            0,
        );
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(both())),
            afk(),
            0,
        );

        // Member 1 mutes after 2 minutes: those are credited, timer stops
        let fx = machine.apply(
            &transition(1, Some(CH1), false, Some(CH1), true),
            &snapshot(Some(both()), Some(both())),
            afk(),
            120,
        );
        assert_eq!(fx, vec![connected(key(1), 2)]);

        // Five muted minutes pass; unmuting restarts accrual
        let fx = machine.apply(
            &transition(1, Some(CH1), true, Some(CH1), false),
            &snapshot(Some(both()), Some(both())),
            afk(),
            420,
        );
        assert!(fx.is_empty());

        // One more minute, then disconnect: only that minute is credited
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            480,
        );
        assert!(fx.contains(&connected(key(1), 1)));
    }

    #[test]
    fn test_mute_toggle_while_paused_has_no_timing_effect() {
        let mut machine = PresenceMachine::new();

        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1], &[]))),
            afk(),
            0,
        );

        let fx = machine.apply(
            &transition(1, Some(CH1), false, Some(CH1), true),
            &snapshot(Some(occupancy(&[1], &[])), Some(occupancy(&[1], &[]))),
            afk(),
            60,
        );
        assert!(fx.is_empty());

        // Unmuting alone must not start a timer either
        let fx = machine.apply(
            &transition(1, Some(CH1), true, Some(CH1), false),
            &snapshot(Some(occupancy(&[1], &[])), Some(occupancy(&[1], &[]))),
            afk(),
            120,
        );
        assert!(fx.is_empty());

        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[], &[])), None),
            afk(),
            600,
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_resume_respects_mute() {
        let mut machine = PresenceMachine::new();

        // Member 1 waits alone, muted
        machine.apply(
            &transition(1, None, false, Some(CH1), true),
            &snapshot(None, Some(occupancy(&[1], &[]))),
            afk(),
            0,
        );

        // A companion arrives: member 2 starts accruing, member 1 stays
        // paused because of the mute guard
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1, 2], &[]))),
            afk(),
            60,
        );

        let fx = machine.apply(
            &transition(1, Some(CH1), true, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            660,
        );
        // Member 1 earned nothing; member 2's accompanied time settles
        assert!(!fx.iter().any(|e| e.key == key(1)));
        assert!(fx.contains(&connected(key(2), 10)));
    }

    #[test]
    fn test_away_channel_separation() {
        let mut machine = PresenceMachine::new();
        let both = || occupancy(&[1, 2], &[]);

        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(both())),
            afk(),
            0,
        );
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(both())),
            afk(),
            0,
        );

        // Member 1 goes away after five minutes: connected time settles,
        // afk timer starts; member 2 is left alone and settles too
        let fx = machine.apply(
            &transition(1, Some(CH1), false, Some(AFK), false),
            &snapshot(Some(occupancy(&[2], &[])), Some(occupancy(&[1], &[]))),
            afk(),
            300,
        );
        assert!(fx.contains(&connected(key(1), 5)));
        assert!(fx.contains(&connected(key(2), 5)));

        // Ten minutes away, then back to the channel where member 2 waits
        let fx = machine.apply(
            &transition(1, Some(AFK), false, Some(CH1), false),
            &snapshot(Some(occupancy(&[], &[])), Some(both())),
            afk(),
            900,
        );
        assert_eq!(
            fx,
            vec![CreditEffect {
                key: key(1),
                kind: CreditKind::Afk,
                minutes: 10
            }]
        );

        // Both accrue again; disconnect one minute later credits 1 each
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            960,
        );
        assert!(fx.contains(&connected(key(1), 1)));
        assert!(fx.contains(&connected(key(2), 1)));
    }

    #[test]
    fn test_afk_timer_runs_alone_and_muted() {
        let mut machine = PresenceMachine::new();

        machine.apply(
            &transition(1, None, false, Some(AFK), true),
            &snapshot(None, Some(occupancy(&[1], &[]))),
            afk(),
            0,
        );

        let fx = machine.apply(
            &transition(1, Some(AFK), true, None, false),
            &snapshot(Some(occupancy(&[], &[])), None),
            afk(),
            720,
        );
        assert_eq!(
            fx,
            vec![CreditEffect {
                key: key(1),
                kind: CreditKind::Afk,
                minutes: 12
            }]
        );
    }

    #[test]
    fn test_duplicate_disconnect_is_noop() {
        let mut machine = PresenceMachine::new();
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[], &[])), None),
            afk(),
            500,
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_bots_do_not_make_a_channel_accompanied() {
        let mut machine = PresenceMachine::new();

        // One human plus one bot is still "alone"
        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1], &[5]))),
            afk(),
            0,
        );

        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[], &[5])), None),
            afk(),
            600,
        );
        assert!(fx.is_empty());
    }

    #[test]
    fn test_move_between_real_channels_settles_and_restarts() {
        let mut machine = PresenceMachine::new();

        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1, 2], &[]))),
            afk(),
            0,
        );
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[1, 2], &[]))),
            afk(),
            0,
        );
        // Member 3 waits alone in the other channel
        machine.apply(
            &transition(3, None, false, Some(CH2), false),
            &snapshot(None, Some(occupancy(&[3], &[]))),
            afk(),
            0,
        );

        // Member 1 hops channels after four minutes: settled, fresh timer;
        // member 2 left alone settles; member 3 resumes
        let fx = machine.apply(
            &transition(1, Some(CH1), false, Some(CH2), false),
            &snapshot(Some(occupancy(&[2], &[])), Some(occupancy(&[1, 3], &[]))),
            afk(),
            240,
        );
        assert!(fx.contains(&connected(key(1), 4)));
        assert!(fx.contains(&connected(key(2), 4)));

        // Two minutes later member 1 leaves: 2 minutes in the new channel,
        // and member 3 settles the same 2 accompanied minutes
        let fx = machine.apply(
            &transition(1, Some(CH2), false, None, false),
            &snapshot(Some(occupancy(&[3], &[])), None),
            afk(),
            360,
        );
        assert!(fx.contains(&connected(key(1), 2)));
        assert!(fx.contains(&connected(key(3), 2)));
    }

    #[test]
    fn test_sub_minute_session_credits_zero() {
        let mut machine = PresenceMachine::new();
        let both = || occupancy(&[1, 2], &[]);

        machine.apply(
            &transition(1, None, false, Some(CH1), false),
            &snapshot(None, Some(both())),
            afk(),
            0,
        );
        let fx = machine.apply(
            &transition(1, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            59,
        );
        assert!(fx.contains(&connected(key(1), 0)));
    }

    #[test]
    fn test_unknown_lone_member_resumes_on_join() {
        let mut machine = PresenceMachine::new();

        // No session for member 7 (connected before a restart); a companion
        // arriving starts their timer from now
        machine.apply(
            &transition(2, None, false, Some(CH1), false),
            &snapshot(None, Some(occupancy(&[2, 7], &[]))),
            afk(),
            0,
        );

        let fx = machine.apply(
            &transition(7, Some(CH1), false, None, false),
            &snapshot(Some(occupancy(&[2], &[])), None),
            afk(),
            300,
        );
        assert!(fx.contains(&connected(key(7), 5)));
    }
}

use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{BotError, Result};
use crate::notify::SharedNotifier;
use crate::store::{ActivityKind, Adjustment, ProfileStore, SharedProfileStore, VoiceProfile};

use super::event::{TransitionSnapshot, VoiceTransition};
use super::machine::{CreditEffect, CreditKind, PresenceMachine};

/// What the caller of an admin operation is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Member,
    Administrator,
}

enum CreditOutcome {
    Applied { leveled_to: Option<u32> },
    MissingProfile,
}

/// Orchestrates the presence machine against the store and notifier.
///
/// All mutation runs behind one async mutex: a transition is fully applied —
/// machine step, store writes, re-rank — before the next one starts, so no
/// rank computation ever overlaps an accumulation write.
pub struct VoiceTracker {
    machine: tokio::sync::Mutex<PresenceMachine>,
    clock: Arc<dyn Clock>,
    store: SharedProfileStore,
    notifier: SharedNotifier,
}

impl VoiceTracker {
    pub fn new(clock: Arc<dyn Clock>, store: SharedProfileStore, notifier: SharedNotifier) -> Self {
        Self {
            machine: tokio::sync::Mutex::new(PresenceMachine::new()),
            clock,
            store,
            notifier,
        }
    }

    /// Process one gateway transition.
    ///
    /// Store failures abandon the affected credit with a logged error; they
    /// never block the remaining credits of the same transition, and there
    /// is no retry queue.
    pub async fn process_transition(
        &self,
        transition: VoiceTransition,
        snapshot: TransitionSnapshot,
        afk_channel: Option<ChannelId>,
        member_name: &str,
    ) {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now_secs();
        let effects = machine.apply(&transition, &snapshot, afk_channel, now);
        debug!(
            "Transition for member {} in guild {}: {} credit(s), {} tracked session(s)",
            transition.member,
            transition.guild,
            effects.len(),
            machine.session_count()
        );

        for effect in effects {
            let name_hint = (effect.key.member == transition.member).then_some(member_name);
            if let Err(e) = self.apply_credit(&effect, name_hint).await {
                error!(
                    "Dropping {} min credit for member {} in guild {}: {}",
                    effect.minutes, effect.key.member, effect.key.guild, e
                );
            }
        }
    }

    /// Apply one credit effect: upsert, level-up notification, re-rank.
    /// A missing profile is created zeroed and the credit re-dispatched once.
    async fn apply_credit(&self, effect: &CreditEffect, name_hint: Option<&str>) -> Result<()> {
        let guild = effect.key.guild.to_string();
        let member = effect.key.member.to_string();

        let leveled_to = match self.try_credit(effect).await? {
            CreditOutcome::Applied { leveled_to } => leveled_to,
            CreditOutcome::MissingProfile => {
                let name = name_hint.unwrap_or(member.as_str());
                self.store
                    .upsert_voice(&guild, VoiceProfile::new(&member, name))
                    .await?;
                match self.try_credit(effect).await? {
                    CreditOutcome::Applied { leveled_to } => leveled_to,
                    CreditOutcome::MissingProfile => {
                        warn!(
                            "Profile for member {} still missing after creation, dropping credit",
                            member
                        );
                        return Ok(());
                    }
                }
            }
        };

        if let Some(new_level) = leveled_to {
            info!(
                "Member {} reached voice level {} in guild {}",
                member, new_level, guild
            );
            self.notifier
                .notify_level_up(effect.key.guild, effect.key.member, ActivityKind::Voice, new_level)
                .await;
        }

        self.store.rerank_voice(&guild).await
    }

    async fn try_credit(&self, effect: &CreditEffect) -> Result<CreditOutcome> {
        let guild = effect.key.guild.to_string();
        let member = effect.key.member.to_string();

        let Some(mut profile) = self.store.get_voice(&guild, &member).await? else {
            return Ok(CreditOutcome::MissingProfile);
        };

        let leveled_to = match effect.kind {
            CreditKind::Connected => profile.credit_minutes(effect.minutes),
            CreditKind::Afk => {
                profile.credit_afk_minutes(effect.minutes);
                None
            }
        };

        self.store.upsert_voice(&guild, profile).await?;
        Ok(CreditOutcome::Applied { leveled_to })
    }

    /// Manually add connected minutes to a member's record
    pub async fn add_time(
        &self,
        capability: Capability,
        guild: GuildId,
        member: UserId,
        member_name: &str,
        minutes: u64,
    ) -> Result<VoiceProfile> {
        self.adjust(capability, guild, member, member_name, Adjustment::Add(minutes))
            .await
    }

    /// Manually remove connected minutes, clamping the accumulator at zero
    pub async fn remove_time(
        &self,
        capability: Capability,
        guild: GuildId,
        member: UserId,
        member_name: &str,
        minutes: u64,
    ) -> Result<VoiceProfile> {
        self.adjust(
            capability,
            guild,
            member,
            member_name,
            Adjustment::Remove(minutes),
        )
        .await
    }

    async fn adjust(
        &self,
        capability: Capability,
        guild: GuildId,
        member: UserId,
        member_name: &str,
        adjustment: Adjustment,
    ) -> Result<VoiceProfile> {
        require_admin(capability)?;

        // Serialize with in-flight crediting
        let _machine = self.machine.lock().await;

        let guild_id = guild.to_string();
        let member_id = member.to_string();
        let mut profile = self
            .store
            .get_voice(&guild_id, &member_id)
            .await?
            .unwrap_or_else(|| VoiceProfile::new(&member_id, member_name));

        profile.adjust(adjustment);
        info!(
            "Manual adjustment {:?} for member {} in guild {} (now {} min)",
            adjustment, member_id, guild_id, profile.minutes
        );

        self.store.upsert_voice(&guild_id, profile.clone()).await?;
        self.store.rerank_voice(&guild_id).await?;

        Ok(self
            .store
            .get_voice(&guild_id, &member_id)
            .await?
            .unwrap_or(profile))
    }

    /// Zero a member's counters and audit fields, keeping the row
    pub async fn reset(
        &self,
        capability: Capability,
        guild: GuildId,
        member: UserId,
        member_name: &str,
    ) -> Result<()> {
        require_admin(capability)?;

        let _machine = self.machine.lock().await;

        let guild_id = guild.to_string();
        let member_id = member.to_string();
        let mut profile = self
            .store
            .get_voice(&guild_id, &member_id)
            .await?
            .unwrap_or_else(|| VoiceProfile::new(&member_id, member_name));

        profile.reset();
        info!("Reset voice record of member {} in guild {}", member_id, guild_id);

        self.store.upsert_voice(&guild_id, profile).await?;
        self.store.rerank_voice(&guild_id).await
    }
}

fn require_admin(capability: Capability) -> Result<()> {
    if capability != Capability::Administrator {
        return Err(BotError::PermissionDenied {
            message: "administrator capability required".to_string(),
        });
    }
    Ok(())
}

/// Shared tracker type
pub type SharedVoiceTracker = Arc<VoiceTracker>;

pub fn create_shared_voice_tracker(
    clock: Arc<dyn Clock>,
    store: SharedProfileStore,
    notifier: SharedNotifier,
) -> SharedVoiceTracker {
    Arc::new(VoiceTracker::new(clock, store, notifier))
}

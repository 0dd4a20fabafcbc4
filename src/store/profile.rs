use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::leveling::{self, LevelProgress};

/// Which activity table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Voice,
    Text,
}

/// Database of activity profiles, partitioned per guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDatabase {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp (Unix seconds)
    pub last_updated: i64,

    /// Per-guild profiles (guild ID -> tables)
    pub guilds: HashMap<String, GuildProfiles>,
}

impl Default for ProfileDatabase {
    fn default() -> Self {
        Self {
            version: 1,
            last_updated: chrono::Utc::now().timestamp(),
            guilds: HashMap::new(),
        }
    }
}

impl ProfileDatabase {
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
            Err(e) => Err(crate::error::BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
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

    /// Get or create a guild partition
    pub fn guild_mut(&mut self, guild_id: &str) -> &mut GuildProfiles {
        self.touch();
        self.guilds.entry(guild_id.to_string()).or_default()
    }

    /// Get a guild partition (read-only)
    pub fn guild(&self, guild_id: &str) -> Option<&GuildProfiles> {
        self.guilds.get(guild_id)
    }

    /// Recompute dense ranks for one guild's voice table
    pub fn rerank_voice(&mut self, guild_id: &str) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            let order: Vec<(String, u64)> = guild
                .voice
                .iter()
                .map(|(id, p)| (id.clone(), p.minutes))
                .collect();
            for (id, rank) in dense_ranks(order) {
                if let Some(profile) = guild.voice.get_mut(&id) {
                    profile.rank = rank;
                }
            }
        }
        self.touch();
    }

    /// Recompute dense ranks for one guild's text table
    pub fn rerank_text(&mut self, guild_id: &str) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            let order: Vec<(String, u64)> = guild
                .text
                .iter()
                .map(|(id, p)| (id.clone(), p.xp))
                .collect();
            for (id, rank) in dense_ranks(order) {
                if let Some(profile) = guild.text.get_mut(&id) {
                    profile.rank = rank;
                }
            }
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.last_updated = chrono::Utc::now().timestamp();
    }
}

/// Dense ranking over (id, points): ties share a rank, the next distinct
/// value gets the previous rank plus one, no gaps.
fn dense_ranks(mut points_by_id: Vec<(String, u64)>) -> Vec<(String, u32)> {
    // Secondary sort on id keeps iteration deterministic; it does not affect
    // the rank values since ties share a rank anyway.
    points_by_id.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut ranks = Vec::with_capacity(points_by_id.len());
    let mut rank = 0u32;
    let mut previous: Option<u64> = None;
    for (id, points) in points_by_id {
        if previous != Some(points) {
            rank += 1;
            previous = Some(points);
        }
        ranks.push((id, rank));
    }
    ranks
}

/// Both activity tables of one guild
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuildProfiles {
    /// Voice profiles (member ID -> profile)
    pub voice: HashMap<String, VoiceProfile>,

    /// Text profiles (member ID -> profile)
    pub text: HashMap<String, TextProfile>,
}

impl GuildProfiles {
    /// Voice profiles ordered by minutes descending
    pub fn top_voice(&self, limit: usize) -> Vec<VoiceProfile> {
        let mut profiles: Vec<VoiceProfile> = self.voice.values().cloned().collect();
        profiles.sort_by(|a, b| b.minutes.cmp(&a.minutes).then_with(|| a.id.cmp(&b.id)));
        profiles.truncate(limit);
        profiles
    }

    /// Text profiles ordered by XP descending
    pub fn top_text(&self, limit: usize) -> Vec<TextProfile> {
        let mut profiles: Vec<TextProfile> = self.text.values().cloned().collect();
        profiles.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.id.cmp(&b.id)));
        profiles.truncate(limit);
        profiles
    }
}

/// Manual adjustment applied by an administrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Add(u64),
    Remove(u64),
}

/// Counters tracing manual adjustments to a profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuditCounters {
    pub add_count: u32,
    pub remove_count: u32,
    pub added_total: u64,
    pub removed_total: u64,
}

impl AuditCounters {
    fn record(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Add(amount) => {
                self.add_count += 1;
                self.added_total += amount;
            }
            Adjustment::Remove(amount) => {
                self.remove_count += 1;
                // The requested amount is recorded even when the accumulator
                // clamps at zero, so the adjustment history stays complete.
                self.removed_total += amount;
            }
        }
    }
}

/// Accumulated voice activity for one member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceProfile {
    /// Member ID (snowflake as string)
    pub id: String,

    /// Display name at last update
    pub name: String,

    /// Total connected minutes ever credited
    pub minutes: u64,

    /// Total minutes credited while in the away channel
    pub afk_minutes: u64,

    /// Derived from `minutes`; stored only as a starting point, re-derived
    /// on every mutation
    pub level: u32,

    /// Dense rank by minutes descending among the guild's profiles
    pub rank: u32,

    #[serde(default)]
    pub audit: AuditCounters,
}

impl VoiceProfile {
    /// Create a zeroed profile
    pub fn new(member_id: &str, name: &str) -> Self {
        Self {
            id: member_id.to_string(),
            name: name.to_string(),
            minutes: 0,
            afk_minutes: 0,
            level: 0,
            rank: 0,
            audit: AuditCounters::default(),
        }
    }

    /// Level and progress derived from the stored total
    pub fn progress(&self) -> LevelProgress {
        leveling::progress_for(self.minutes)
    }

    /// Credit connected minutes and re-derive the level.
    /// Returns the new level if the credit crossed a boundary.
    pub fn credit_minutes(&mut self, minutes: u64) -> Option<u32> {
        self.minutes += minutes;
        self.rederive_level()
    }

    /// Credit away-channel minutes. Never affects the level.
    pub fn credit_afk_minutes(&mut self, minutes: u64) {
        self.afk_minutes += minutes;
    }

    /// Apply a manual adjustment, clamping the accumulator at zero
    pub fn adjust(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Add(amount) => self.minutes += amount,
            Adjustment::Remove(amount) => self.minutes = self.minutes.saturating_sub(amount),
        }
        self.audit.record(adjustment);
        self.rederive_level();
    }

    /// Zero all counters and audit fields, keeping the row
    pub fn reset(&mut self) {
        self.minutes = 0;
        self.afk_minutes = 0;
        self.level = 0;
        self.audit = AuditCounters::default();
    }

    fn rederive_level(&mut self) -> Option<u32> {
        let derived = leveling::level_for(self.minutes);
        let leveled_up = derived > self.level;
        self.level = derived;
        leveled_up.then_some(derived)
    }
}

/// Accumulated text activity for one member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextProfile {
    /// Member ID (snowflake as string)
    pub id: String,

    /// Display name at last update
    pub name: String,

    /// Messages counted
    pub messages: u64,

    /// Total XP ever credited
    pub xp: u64,

    /// Derived from `xp`; re-derived on every mutation
    pub level: u32,

    /// Dense rank by XP descending among the guild's profiles
    pub rank: u32,

    #[serde(default)]
    pub audit: AuditCounters,
}

impl TextProfile {
    /// Create a zeroed profile
    pub fn new(member_id: &str, name: &str) -> Self {
        Self {
            id: member_id.to_string(),
            name: name.to_string(),
            messages: 0,
            xp: 0,
            level: 0,
            rank: 0,
            audit: AuditCounters::default(),
        }
    }

    /// Level and progress derived from the stored total
    pub fn progress(&self) -> LevelProgress {
        leveling::progress_for(self.xp)
    }

    /// Count one message worth `xp` points and re-derive the level.
    /// Returns the new level if the credit crossed a boundary.
    pub fn credit_message(&mut self, xp: u64) -> Option<u32> {
        self.messages += 1;
        self.xp += xp;
        self.rederive_level()
    }

    /// Apply a manual adjustment, clamping the accumulator at zero
    pub fn adjust(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Add(amount) => self.xp += amount,
            Adjustment::Remove(amount) => self.xp = self.xp.saturating_sub(amount),
        }
        self.audit.record(adjustment);
        self.rederive_level();
    }

    /// Zero all counters and audit fields, keeping the row
    pub fn reset(&mut self) {
        self.messages = 0;
        self.xp = 0;
        self.level = 0;
        self.audit = AuditCounters::default();
    }

    fn rederive_level(&mut self) -> Option<u32> {
        let derived = leveling::level_for(self.xp);
        let leveled_up = derived > self.level;
        self.level = derived;
        leveled_up.then_some(derived)
    }
}

/// Shared profile database type
pub type SharedProfileDatabase = Arc<tokio::sync::RwLock<ProfileDatabase>>;

pub fn create_shared_profile_database(db: ProfileDatabase) -> SharedProfileDatabase {
    Arc::new(tokio::sync::RwLock::new(db))
}

pub mod profile;

pub use profile::{
    create_shared_profile_database, ActivityKind, Adjustment, AuditCounters, GuildProfiles,
    ProfileDatabase, SharedProfileDatabase, TextProfile, VoiceProfile,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Persistence contract for activity profiles.
///
/// Implementable over any transactional row store; the shipped
/// implementation is a JSON document saved atomically after every mutation.
/// `rerank_*` recomputes dense ranks over a whole guild partition and is
/// safe to run redundantly.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_voice(&self, guild_id: &str, member_id: &str) -> Result<Option<VoiceProfile>>;
    async fn upsert_voice(&self, guild_id: &str, profile: VoiceProfile) -> Result<()>;
    async fn rerank_voice(&self, guild_id: &str) -> Result<()>;
    async fn top_voice(&self, guild_id: &str, limit: usize) -> Result<Vec<VoiceProfile>>;

    async fn get_text(&self, guild_id: &str, member_id: &str) -> Result<Option<TextProfile>>;
    async fn upsert_text(&self, guild_id: &str, profile: TextProfile) -> Result<()>;
    async fn rerank_text(&self, guild_id: &str) -> Result<()>;
    async fn top_text(&self, guild_id: &str, limit: usize) -> Result<Vec<TextProfile>>;
}

/// File-backed store persisting the shared database after every mutation
pub struct JsonProfileStore {
    db: SharedProfileDatabase,
    path: String,
}

impl JsonProfileStore {
    pub fn new(db: SharedProfileDatabase, path: &str) -> Self {
        Self {
            db,
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn get_voice(&self, guild_id: &str, member_id: &str) -> Result<Option<VoiceProfile>> {
        let db = self.db.read().await;
        Ok(db
            .guild(guild_id)
            .and_then(|g| g.voice.get(member_id))
            .cloned())
    }

    async fn upsert_voice(&self, guild_id: &str, profile: VoiceProfile) -> Result<()> {
        let mut db = self.db.write().await;
        db.guild_mut(guild_id)
            .voice
            .insert(profile.id.clone(), profile);
        db.save(&self.path).await
    }

    async fn rerank_voice(&self, guild_id: &str) -> Result<()> {
        let mut db = self.db.write().await;
        db.rerank_voice(guild_id);
        db.save(&self.path).await
    }

    async fn top_voice(&self, guild_id: &str, limit: usize) -> Result<Vec<VoiceProfile>> {
        let db = self.db.read().await;
        Ok(db
            .guild(guild_id)
            .map(|g| g.top_voice(limit))
            .unwrap_or_default())
    }

    async fn get_text(&self, guild_id: &str, member_id: &str) -> Result<Option<TextProfile>> {
        let db = self.db.read().await;
        Ok(db
            .guild(guild_id)
            .and_then(|g| g.text.get(member_id))
            .cloned())
    }

    async fn upsert_text(&self, guild_id: &str, profile: TextProfile) -> Result<()> {
        let mut db = self.db.write().await;
        db.guild_mut(guild_id)
            .text
            .insert(profile.id.clone(), profile);
        db.save(&self.path).await
    }

    async fn rerank_text(&self, guild_id: &str) -> Result<()> {
        let mut db = self.db.write().await;
        db.rerank_text(guild_id);
        db.save(&self.path).await
    }

    async fn top_text(&self, guild_id: &str, limit: usize) -> Result<Vec<TextProfile>> {
        let db = self.db.read().await;
        Ok(db
            .guild(guild_id)
            .map(|g| g.top_text(limit))
            .unwrap_or_default())
    }
}

/// Shared store handle used across handlers and commands
pub type SharedProfileStore = Arc<dyn ProfileStore>;

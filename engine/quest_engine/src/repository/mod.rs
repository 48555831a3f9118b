//! # Persistence port
//!
//! The engine owns quest state in memory and writes every commit through a
//! [`QuestRepository`]. Two implementations ship with the crate:
//!
//! | Backend                  | Storage                                   |
//! |--------------------------|-------------------------------------------|
//! | [`LocalCacheRepository`] | JSON strings in a quota-bounded key space |
//! | [`RemoteQuestRepository`]| REST record store reached over HTTP       |
//!
//! [`QuestRepository::ensure_capacity`] is the explicit pre-commit quota
//! check; the engine calls it before `save` and rejects the whole commit when
//! it fails.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Quest;

mod local;
mod remote;

pub use local::{LocalCacheRepository, DEFAULT_QUOTA_BYTES};
pub use remote::RemoteQuestRepository;

#[async_trait]
pub trait QuestRepository: Send + Sync {
    async fn load(&self, quest_id: &str) -> Result<Option<Quest>>;

    async fn save(&self, quest: &Quest) -> Result<()>;

    async fn list_ids(&self) -> Result<Vec<String>>;

    /// Fail with `QuotaExceeded` if `quest` would not fit. No limit by default.
    async fn ensure_capacity(&self, _quest: &Quest) -> Result<()> {
        Ok(())
    }
}

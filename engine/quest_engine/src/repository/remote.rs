//! REST record-store client.
//!
//! Expects a store exposing:
//!
//! * `GET  {base}/records`      → JSON array of quest ids
//! * `GET  {base}/records/{id}` → quest record, `404` when absent
//! * `PUT  {base}/records/{id}` → store the record, `413` when too large
//!
//! Requests are made once; the engine never retries a failed write.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::QuestRepository;
use crate::errors::{EngineError, Result};
use crate::types::Quest;

pub struct RemoteQuestRepository {
    client: Client,
    base_url: String,
    max_record_bytes: Option<usize>,
}

impl RemoteQuestRepository {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            max_record_bytes: None,
        }
    }

    /// Reject records larger than `limit` bytes before sending them.
    pub fn with_max_record_bytes(mut self, limit: usize) -> Self {
        self.max_record_bytes = Some(limit);
        self
    }

    /// `{base}/records[/{id}]` with `id` percent-encoded as one path segment.
    fn records_url(&self, quest_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| EngineError::Storage(format!("invalid record store URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                EngineError::Storage(format!("record store URL {} cannot hold a path", self.base_url))
            })?;
            segments.pop_if_empty().push("records");
            if let Some(id) = quest_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        match self.max_record_bytes {
            Some(quota) if size > quota => Err(EngineError::QuotaExceeded {
                required: size,
                quota,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl QuestRepository for RemoteQuestRepository {
    async fn load(&self, quest_id: &str) -> Result<Option<Quest>> {
        let resp = self.client.get(self.records_url(Some(quest_id))?).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let quest = resp.error_for_status()?.json::<Quest>().await?;
        debug!("Loaded quest {quest_id} from {}", self.base_url);
        Ok(Some(quest))
    }

    async fn save(&self, quest: &Quest) -> Result<()> {
        let body = serde_json::to_vec(quest)?;
        let size = body.len();
        self.check_size(size)?;

        let resp = self
            .client
            .put(self.records_url(Some(&quest.id))?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if resp.status() == StatusCode::PAYLOAD_TOO_LARGE {
            warn!("Record store rejected quest {} as too large", quest.id);
            return Err(EngineError::QuotaExceeded {
                required: size,
                quota: self.max_record_bytes.unwrap_or(0),
            });
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let ids = self
            .client
            .get(self.records_url(None)?)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<String>>()
            .await?;
        Ok(ids)
    }

    async fn ensure_capacity(&self, quest: &Quest) -> Result<()> {
        if self.max_record_bytes.is_none() {
            return Ok(());
        }
        self.check_size(serde_json::to_vec(quest)?.len())
    }
}

//! In-memory store — fast, ephemeral, used for tests and as a fallback when
//! no database path is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use mnemon_core::error::MemoryError;
use mnemon_core::memory::{clamp_importance, MemoryFilter, MemoryItem, MemoryStore};

use crate::vector;

/// A HashMap-backed memory store.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, MemoryItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemoryItem>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryItem>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn put(&self, mut item: MemoryItem) -> Result<String, MemoryError> {
        if item.id.is_empty() {
            item.id = Uuid::new_v4().to_string();
        }
        item.importance = clamp_importance(item.importance);
        let id = item.id.clone();
        self.write().insert(id.clone(), item);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemoryError> {
        Ok(self.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.write().remove(id).is_some())
    }

    async fn update_access(&self, id: &str, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let mut items = self.write();
        let item = items.get_mut(id).ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        item.touch(now);
        Ok(())
    }

    async fn set_importance(&self, id: &str, importance: f32) -> Result<(), MemoryError> {
        let mut items = self.write();
        let item = items.get_mut(id).ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        item.importance = clamp_importance(importance);
        Ok(())
    }

    async fn merge_metadata(
        &self,
        id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MemoryError> {
        let mut items = self.write();
        let item = items.get_mut(id).ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        for (k, v) in patch {
            item.metadata.insert(k, v);
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        agent_id: &str,
        embedding: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let candidates: Vec<MemoryItem> = self
            .read()
            .values()
            .filter(|i| i.agent_id == agent_id && i.embedding.is_some() && filter.matches(i))
            .cloned()
            .collect();

        Ok(vector::rank_by_similarity(&candidates, embedding, k, 0.0)
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    async fn list(
        &self,
        agent_id: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let mut items: Vec<MemoryItem> = self
            .read()
            .values()
            .filter(|i| i.agent_id == agent_id && filter.matches(i))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }
}

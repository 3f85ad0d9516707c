//! Media item repository.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;

use crate::database::models::MediaItemDbModel;
use crate::domain::{AcquisitionState, MediaItem};
use crate::{Error, Result};

/// Persistence interface for tracked media items.
#[async_trait]
pub trait MediaItemRepository: Send + Sync {
    /// Insert or replace the full item record.
    async fn save_item(&self, item: &MediaItem) -> Result<()>;
    async fn get_item(&self, id: &str) -> Result<MediaItem>;
    /// Items in `state`, excluding soft-deleted ones.
    async fn load_items_by_state(&self, state: AcquisitionState) -> Result<Vec<MediaItem>>;
    /// Items in `state`, soft-deleted ones included.
    async fn load_items_by_state_including_deleted(
        &self,
        state: AcquisitionState,
    ) -> Result<Vec<MediaItem>>;
    async fn list_items(&self) -> Result<Vec<MediaItem>>;
    /// Set the soft-deletion marker.
    async fn soft_delete_item(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of MediaItemRepository.
pub struct SqlxMediaItemRepository {
    pool: SqlitePool,
}

impl SqlxMediaItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_domain_all(rows: Vec<MediaItemDbModel>) -> Result<Vec<MediaItem>> {
    rows.into_iter().map(MediaItemDbModel::into_domain).collect()
}

#[async_trait]
impl MediaItemRepository for SqlxMediaItemRepository {
    async fn save_item(&self, item: &MediaItem) -> Result<()> {
        let model = MediaItemDbModel::from_domain(item)?;
        sqlx::query(
            r#"
            INSERT INTO media_items (
                id, kind, title, media, state, current_candidate, backend_transfer_id,
                failed_candidates, candidate_list, abort_requested, torrents_not_found,
                last_error, deleted_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                media = excluded.media,
                state = excluded.state,
                current_candidate = excluded.current_candidate,
                backend_transfer_id = excluded.backend_transfer_id,
                failed_candidates = excluded.failed_candidates,
                candidate_list = excluded.candidate_list,
                abort_requested = excluded.abort_requested,
                torrents_not_found = excluded.torrents_not_found,
                last_error = excluded.last_error,
                deleted_at = excluded.deleted_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&model.id)
        .bind(&model.kind)
        .bind(&model.title)
        .bind(&model.media)
        .bind(&model.state)
        .bind(&model.current_candidate)
        .bind(&model.backend_transfer_id)
        .bind(&model.failed_candidates)
        .bind(&model.candidate_list)
        .bind(model.abort_requested)
        .bind(model.torrents_not_found)
        .bind(&model.last_error)
        .bind(model.deleted_at)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<MediaItem> {
        sqlx::query_as::<_, MediaItemDbModel>("SELECT * FROM media_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("MediaItem", id))?
            .into_domain()
    }

    async fn load_items_by_state(&self, state: AcquisitionState) -> Result<Vec<MediaItem>> {
        let rows = sqlx::query_as::<_, MediaItemDbModel>(
            "SELECT * FROM media_items WHERE state = ? AND deleted_at IS NULL ORDER BY created_at",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_domain_all(rows)
    }

    async fn load_items_by_state_including_deleted(
        &self,
        state: AcquisitionState,
    ) -> Result<Vec<MediaItem>> {
        let rows = sqlx::query_as::<_, MediaItemDbModel>(
            "SELECT * FROM media_items WHERE state = ? ORDER BY created_at",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_domain_all(rows)
    }

    async fn list_items(&self) -> Result<Vec<MediaItem>> {
        let rows = sqlx::query_as::<_, MediaItemDbModel>(
            "SELECT * FROM media_items ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        into_domain_all(rows)
    }

    async fn soft_delete_item(&self, id: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "UPDATE media_items SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            // Already deleted is fine; missing is not.
            self.get_item(id).await?;
        }
        Ok(())
    }
}

/// In-process repository backed by a concurrent map.
///
/// Useful when embedding the supervisor without SQLite, and in tests.
#[derive(Default)]
pub struct InMemoryMediaItemRepository {
    items: DashMap<String, MediaItem>,
}

impl InMemoryMediaItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, filter: impl Fn(&MediaItem) -> bool) -> Vec<MediaItem> {
        let mut items: Vec<MediaItem> = self
            .items
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items
    }
}

#[async_trait]
impl MediaItemRepository for InMemoryMediaItemRepository {
    async fn save_item(&self, item: &MediaItem) -> Result<()> {
        self.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<MediaItem> {
        self.items
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("MediaItem", id))
    }

    async fn load_items_by_state(&self, state: AcquisitionState) -> Result<Vec<MediaItem>> {
        Ok(self.collect(|item| item.state() == state && !item.is_deleted()))
    }

    async fn load_items_by_state_including_deleted(
        &self,
        state: AcquisitionState,
    ) -> Result<Vec<MediaItem>> {
        Ok(self.collect(|item| item.state() == state))
    }

    async fn list_items(&self) -> Result<Vec<MediaItem>> {
        Ok(self.collect(|_| true))
    }

    async fn soft_delete_item(&self, id: &str) -> Result<()> {
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or_else(|| Error::not_found("MediaItem", id))?;
        if entry.deleted_at.is_none() {
            entry.deleted_at = Some(Utc::now());
            entry.touch();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_filters_deleted() {
        let repo = InMemoryMediaItemRepository::new();
        let mut a = MediaItem::episode("a", "Show", 1, 1);
        a.acquisition.state = AcquisitionState::Downloading;
        let mut b = MediaItem::episode("b", "Show", 1, 2);
        b.acquisition.state = AcquisitionState::Downloading;
        repo.save_item(&a).await.unwrap();
        repo.save_item(&b).await.unwrap();

        repo.soft_delete_item("b").await.unwrap();

        let visible = repo
            .load_items_by_state(AcquisitionState::Downloading)
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a");

        let all = repo
            .load_items_by_state_including_deleted(AcquisitionState::Downloading)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_get_missing() {
        let repo = InMemoryMediaItemRepository::new();
        assert!(matches!(
            repo.get_item("nope").await,
            Err(Error::NotFound { .. })
        ));
        assert!(repo.soft_delete_item("nope").await.is_err());
    }
}

//! Integration tests for the SQLite persistence layer.
//!
//! These tests use an in-memory database with the real migrations applied.

use media_acquire::Error;
use media_acquire::database::{
    DbPool, MediaItemRepository, SqlxMediaItemRepository, init_pool_with_size, run_migrations,
};
use media_acquire::domain::{AcquisitionState, Candidate, MediaItem, MediaKind};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    // Each in-memory connection is its own database, so keep one.
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn candidate(id: &str) -> Candidate {
    Candidate::new(id, format!("Release {}", id), format!("magnet:?xt=urn:btih:{}", id), 10)
}

mod schema_tests {
    use super::*;

    #[tokio::test]
    async fn test_media_items_table_exists() {
        let pool = setup_test_db().await;

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("Failed to query tables");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"media_items"), "media_items table missing");
    }

    #[tokio::test]
    async fn test_journal_mode() {
        let pool = setup_test_db().await;

        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("Failed to query journal mode");

        // In-memory databases cannot switch to WAL.
        assert!(result.0 == "memory" || result.0 == "wal");
    }
}

mod media_item_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get_round_trips_acquisition_record() {
        let repo = SqlxMediaItemRepository::new(setup_test_db().await);

        let mut item = MediaItem::episode("ep-1", "Severance", 2, 3);
        item.set_state(AcquisitionState::Pending).unwrap();
        item.set_state(AcquisitionState::Downloading).unwrap();
        item.acquisition.record_failure(&candidate("a"));
        item.acquisition.candidate_list = vec![candidate("b"), candidate("c")];
        item.acquisition.attach_transfer(
            candidate("b").with_unique_temp_dir(std::path::Path::new("/tmp/acq"), "ep-1"),
            "42".into(),
        );
        item.acquisition.last_error = Some("stalled".into());
        repo.save_item(&item).await.unwrap();

        let loaded = repo.get_item("ep-1").await.unwrap();
        assert_eq!(loaded.kind, item.kind);
        assert_eq!(loaded.acquisition, item.acquisition);
        assert_eq!(loaded.title(), "Severance S02E03");
        assert!(matches!(loaded.kind, MediaKind::Episode(ref e) if e.season == 2));
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let repo = SqlxMediaItemRepository::new(setup_test_db().await);

        let mut item = MediaItem::movie("mv-1", "Heat", Some(1995));
        repo.save_item(&item).await.unwrap();
        item.set_state(AcquisitionState::Pending).unwrap();
        repo.save_item(&item).await.unwrap();

        let all = repo.list_items().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state(), AcquisitionState::Pending);
    }

    #[tokio::test]
    async fn test_get_missing_item_is_not_found() {
        let repo = SqlxMediaItemRepository::new(setup_test_db().await);
        let result = repo.get_item("nope").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_soft_deleted_items_only_visible_to_recovery_query() {
        let repo = SqlxMediaItemRepository::new(setup_test_db().await);

        let mut kept = MediaItem::movie("mv-1", "Heat", Some(1995));
        let mut deleted = MediaItem::movie("mv-2", "Ronin", Some(1998));
        for item in [&mut kept, &mut deleted] {
            item.set_state(AcquisitionState::Pending).unwrap();
            item.set_state(AcquisitionState::Downloading).unwrap();
            repo.save_item(item).await.unwrap();
        }
        repo.soft_delete_item("mv-2").await.unwrap();
        // Deleting twice is fine.
        repo.soft_delete_item("mv-2").await.unwrap();

        let visible = repo
            .load_items_by_state(AcquisitionState::Downloading)
            .await
            .unwrap();
        let all = repo
            .load_items_by_state_including_deleted(AcquisitionState::Downloading)
            .await
            .unwrap();

        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "mv-1");
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|i| i.id == "mv-2" && i.is_deleted()));

        assert!(matches!(
            repo.soft_delete_item("missing").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected_on_load() {
        let pool = setup_test_db().await;
        let repo = SqlxMediaItemRepository::new(pool.clone());
        repo.save_item(&MediaItem::movie("mv-1", "Heat", None))
            .await
            .unwrap();

        sqlx::query("UPDATE media_items SET state = 'SEEDING' WHERE id = 'mv-1'")
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.get_item("mv-1").await,
            Err(Error::Validation(_))
        ));
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{NewVisit, VisitId, UNKNOWN_MARKET, UNKNOWN_PLATFORM};
    use crate::storage::{SqliteStorage, Storage, StorageError};
    use std::sync::Arc;

    // 2024-01-01T10:00:00Z
    const BASE: i64 = 1_704_103_200_000;
    const HOUR: i64 = 3_600_000;
    const DAY: i64 = 24 * HOUR;

    async fn setup_sqlite() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn anon(path: &str, start: i64, device: &str, market: Option<&str>) -> NewVisit {
        NewVisit::new(path, start)
            .with_raw_device_info(Some(device))
            .with_market(market)
    }

    #[tokio::test]
    async fn test_insert_and_update_end_time() {
        let storage = setup_sqlite().await;

        let visit = anon("/", BASE, r#"{"platform":"iOS"}"#, Some("Shanghai, China"));
        let id = storage.insert(&visit).await.unwrap();
        assert_eq!(id, visit.id);

        assert!(storage.update_end_time(&id, BASE + 150_000).await.unwrap());
        // Last write wins
        assert!(storage.update_end_time(&id, BASE + 90_000).await.unwrap());

        let all = storage.query_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].visit_end_time, Some(BASE + 90_000));
        assert!(all[0].created_at > 0);
    }

    #[tokio::test]
    async fn test_update_end_time_unknown_id_is_noop() {
        let storage = setup_sqlite().await;

        let updated = storage
            .update_end_time(&VisitId::new(), BASE)
            .await
            .unwrap();
        assert!(!updated);
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_end_time_rejects_end_before_start() {
        let storage = setup_sqlite().await;

        let id = storage.insert(&NewVisit::new("/", BASE)).await.unwrap();
        assert!(!storage.update_end_time(&id, BASE - 1).await.unwrap());

        let all = storage.query_all().await.unwrap();
        assert_eq!(all[0].visit_end_time, None);
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let storage = setup_sqlite().await;

        let visit = NewVisit::new("/", BASE);
        storage.insert(&visit).await.unwrap();
        let err = storage.insert(&visit).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn test_query_page_orders_most_recent_first() {
        let storage = setup_sqlite().await;

        for i in 0..5 {
            storage
                .insert(&NewVisit::new(format!("/p{}", i), BASE + i * HOUR))
                .await
                .unwrap();
        }

        let (page, total) = storage.query_page(0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].path, "/p4");
        assert_eq!(page[1].path, "/p3");

        let (page, total) = storage.query_page(4, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path, "/p0");

        let (page, total) = storage.query_page(10, 2).await.unwrap();
        assert_eq!(total, 5);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_rollup_visit_metrics() {
        let storage = setup_sqlite().await;

        let rollup = storage.rollup_visit_metrics().await.unwrap();
        assert_eq!(rollup.total_visits, 0);
        assert_eq!(rollup.unique_visitors, 0);
        assert_eq!(rollup.avg_duration_seconds, None);

        let finished = storage
            .insert(&NewVisit::new("/", BASE).with_email(Some("a@example.com")))
            .await
            .unwrap();
        storage
            .update_end_time(&finished, BASE + 150_000)
            .await
            .unwrap();
        storage
            .insert(&NewVisit::new("/orders", BASE).with_email(Some("a@example.com")))
            .await
            .unwrap();
        storage
            .insert(&anon("/", BASE, "fp-1", None))
            .await
            .unwrap();
        storage
            .insert(&anon("/", BASE + HOUR, "fp-1", None))
            .await
            .unwrap();
        storage
            .insert(&anon("/", BASE, "fp-2", None))
            .await
            .unwrap();
        // Neither email nor fingerprint: not counted as a visitor
        storage.insert(&NewVisit::new("/", BASE)).await.unwrap();

        let rollup = storage.rollup_visit_metrics().await.unwrap();
        assert_eq!(rollup.total_visits, 6);
        assert_eq!(rollup.unique_visitors, 3);
        assert_eq!(rollup.avg_duration_seconds, Some(150.0));
        assert_eq!(rollup.distinct_paths, 2);
    }

    #[tokio::test]
    async fn test_rollup_device_distribution() {
        let storage = setup_sqlite().await;

        for device in [
            r#"{"platform":"iOS"}"#,
            r#"{"platform":"iOS"}"#,
            r#"{"platform":"Android"}"#,
            "{corrupt",
            r#"{"platform":42}"#,
        ] {
            storage
                .insert(&anon("/", BASE, device, None))
                .await
                .unwrap();
        }
        storage.insert(&NewVisit::new("/", BASE)).await.unwrap();

        let rows = storage.rollup_device_distribution().await.unwrap();
        let pairs: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.dimension.as_str(), r.visit_count))
            .collect();
        assert_eq!(
            pairs,
            vec![(UNKNOWN_PLATFORM, 3), ("iOS", 2), ("Android", 1)]
        );
    }

    #[tokio::test]
    async fn test_rollup_market_distribution_dedups_per_visitor_day() {
        let storage = setup_sqlite().await;

        // Same visitor, same day, same market: counted once
        for i in 0..3 {
            storage
                .insert(&anon("/", BASE + i * HOUR, "fp-1", Some("Beijing, China")))
                .await
                .unwrap();
        }
        // Same visitor next day
        storage
            .insert(&anon("/", BASE + DAY, "fp-1", Some("Beijing, China")))
            .await
            .unwrap();
        // Unidentifiable events count separately
        storage
            .insert(&NewVisit::new("/", BASE).with_market(Some("Tokyo, Japan")))
            .await
            .unwrap();
        storage
            .insert(&NewVisit::new("/", BASE).with_market(Some("Tokyo, Japan")))
            .await
            .unwrap();
        storage
            .insert(&anon("/", BASE, "fp-9", None))
            .await
            .unwrap();

        let rows = storage
            .rollup_market_distribution_dedup_daily(0)
            .await
            .unwrap();
        let pairs: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.dimension.as_str(), r.visit_count))
            .collect();
        assert_eq!(
            pairs,
            vec![("Beijing, China", 2), ("Tokyo, Japan", 2), (UNKNOWN_MARKET, 1)]
        );
    }

    #[tokio::test]
    async fn test_rollup_market_distribution_respects_offset() {
        let storage = setup_sqlite().await;

        // 10:00Z and 15:00Z on 2024-01-01 fall on the same UTC day but on
        // different days at UTC+10 (20:00 and 01:00 next day).
        storage
            .insert(&anon("/", BASE, "fp-1", Some("Sydney, Australia")))
            .await
            .unwrap();
        storage
            .insert(&anon("/", BASE + 5 * HOUR, "fp-1", Some("Sydney, Australia")))
            .await
            .unwrap();

        let utc = storage
            .rollup_market_distribution_dedup_daily(0)
            .await
            .unwrap();
        assert_eq!(utc[0].visit_count, 1);

        let plus_ten = storage
            .rollup_market_distribution_dedup_daily(10 * HOUR)
            .await
            .unwrap();
        assert_eq!(plus_ten[0].visit_count, 2);
    }
}

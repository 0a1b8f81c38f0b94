//! Visit log pagination integration tests

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::Arc;
use visitlytics::models::{NewVisit, UNKNOWN_PLATFORM};
use visitlytics::pagination::{PageRequest, PaginationError, Paginator};
use visitlytics::storage::Storage;

async fn seeded_paginator(n: i64) -> (Arc<dyn Storage>, Paginator) {
    let storage = create_test_storage().await;
    let visits: Vec<NewVisit> = (0..n)
        .map(|i| {
            NewVisit::new(format!("/page/{i}"), BASE + i * SECOND)
                .with_raw_device_info(Some(device_json("iOS")))
        })
        .collect();
    insert_all(&storage, &visits).await;

    let paginator = Paginator::new(Arc::clone(&storage));
    (storage, paginator)
}

#[tokio::test]
async fn test_twenty_five_visits_in_pages_of_ten() {
    let (_storage, paginator) = seeded_paginator(25).await;

    let first = paginator.get_page(PageRequest::new(1, 10)).await.unwrap();
    assert_eq!(first.total_count, 25);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.records.len(), 10);

    let third = paginator.get_page(PageRequest::new(3, 10)).await.unwrap();
    assert_eq!(third.records.len(), 5);
    assert_eq!(third.current_page, 3);

    let past_end = paginator.get_page(PageRequest::new(4, 10)).await.unwrap();
    assert!(past_end.records.is_empty());
    assert_eq!(past_end.total_count, 25);
    assert_eq!(past_end.total_pages, 3);
    assert_eq!(past_end.current_page, 4);
}

#[tokio::test]
async fn test_pages_are_most_recent_first() {
    let (_storage, paginator) = seeded_paginator(12).await;

    let page = paginator.get_page(PageRequest::new(1, 5)).await.unwrap();
    let starts: Vec<i64> = page.records.iter().map(|r| r.visit_start_time).collect();
    let mut sorted = starts.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(starts, sorted);
    assert_eq!(page.records[0].path, "/page/11");
}

#[tokio::test]
async fn test_full_sweep_visits_every_record_once() {
    let (_storage, paginator) = seeded_paginator(23).await;

    for page_size in [1, 4, 10, 23, 50] {
        let first = paginator
            .get_page(PageRequest::new(1, page_size))
            .await
            .unwrap();

        let mut seen = HashSet::new();
        let mut swept = 0;
        for page in 1..=first.total_pages {
            let result = paginator
                .get_page(PageRequest::new(page, page_size))
                .await
                .unwrap();
            assert_eq!(result.total_count, 23);
            swept += result.records.len() as i64;
            for record in result.records {
                assert!(seen.insert(record.id), "duplicate record across pages");
            }
        }

        assert_eq!(swept, first.total_count, "page_size {page_size}");
        assert_eq!(first.total_pages, (23 + page_size - 1) / page_size);
    }
}

#[tokio::test]
async fn test_page_below_one_clamps_to_first_page() {
    let (_storage, paginator) = seeded_paginator(7).await;

    let first = paginator.get_page(PageRequest::new(1, 3)).await.unwrap();
    for page in [0, -1, i64::MIN] {
        let clamped = paginator.get_page(PageRequest::new(page, 3)).await.unwrap();
        assert_eq!(clamped.current_page, 1);
        let ids: Vec<_> = clamped.records.iter().map(|r| &r.id).collect();
        let expected: Vec<_> = first.records.iter().map(|r| &r.id).collect();
        assert_eq!(ids, expected);
    }
}

#[tokio::test]
async fn test_page_size_clamped_and_defaulted() {
    let (storage, _) = seeded_paginator(30).await;
    let paginator = Paginator::with_limits(storage, 10, 20);

    let default = paginator.get_page(PageRequest::default()).await.unwrap();
    assert_eq!(default.page_size, 10);
    assert_eq!(default.total_pages, 3);

    let zero = paginator.get_page(PageRequest::new(1, 0)).await.unwrap();
    assert_eq!(zero.page_size, 1);
    assert_eq!(zero.records.len(), 1);
    assert_eq!(zero.total_pages, 30);

    let huge = paginator.get_page(PageRequest::new(1, 1_000)).await.unwrap();
    assert_eq!(huge.page_size, 20);
    assert_eq!(huge.records.len(), 20);
    assert_eq!(huge.total_pages, 2);
}

#[tokio::test]
async fn test_far_page_does_not_overflow() {
    let (_storage, paginator) = seeded_paginator(3).await;

    let result = paginator
        .get_page(PageRequest::new(i64::MAX, 100))
        .await
        .unwrap();
    assert!(result.records.is_empty());
    assert_eq!(result.total_count, 3);
}

#[tokio::test]
async fn test_device_info_normalized_in_records() {
    let storage = create_test_storage().await;
    insert_all(
        &storage,
        &[
            NewVisit::new("/a", BASE).with_raw_device_info(Some("{corrupt")),
            // Double-encoded legacy row
            NewVisit::new("/b", BASE + 1)
                .with_raw_device_info(Some(r#""{\"platform\":\"Android\",\"screenWidth\":412}""#)),
            NewVisit::new("/c", BASE + 2),
        ],
    )
    .await;

    let page = Paginator::new(storage)
        .get_page(PageRequest::new(1, 10))
        .await
        .unwrap();

    let by_path = |path: &str| {
        page.records
            .iter()
            .find(|r| r.path == path)
            .unwrap()
            .device_info
            .clone()
    };
    assert!(by_path("/a").is_empty());
    assert_eq!(by_path("/a").platform_label(), UNKNOWN_PLATFORM);
    assert_eq!(by_path("/b").platform.as_deref(), Some("Android"));
    assert_eq!(by_path("/b").screen_width, Some(412));
    assert!(by_path("/c").is_empty());
}

#[tokio::test]
async fn test_query_failure_surfaces_error() {
    let paginator = Paginator::new(Arc::new(FailingStorage));
    let result = paginator.get_page(PageRequest::new(1, 10)).await;
    assert!(matches!(result, Err(PaginationError::Storage(_))));
}

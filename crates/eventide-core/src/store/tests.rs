//! Tests for store module
//!
//! Every scenario runs against both backends to keep them behaviourally
//! identical.

use super::*;
use crate::error::Error;
use crate::event::AppendInput;
use crate::handler::{handler_fn, HandlerError};
use chrono::Duration;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

async fn backends() -> Vec<Arc<dyn EventLog>> {
    vec![
        Arc::new(MemoryEventLog::new()),
        Arc::new(SqliteEventLog::in_memory().await.unwrap()),
    ]
}

#[test]
fn test_event_query_builder() {
    let query = EventQuery::new()
        .for_entity("Contact", "c1")
        .with_verb("update")
        .paginate(10, 5);

    assert_eq!(query.entity_type.as_deref(), Some("Contact"));
    assert_eq!(query.entity_id.as_deref(), Some("c1"));
    assert_eq!(query.verb.as_deref(), Some("update"));
    assert_eq!(query.limit, Some(10));
    assert_eq!(query.offset, 5);
}

#[test]
fn test_cdc_options_empty_cursor_means_start() {
    assert_eq!(CdcOptions::new().after("").after, None);
    assert_eq!(CdcOptions::new().after("abc").after.as_deref(), Some("abc"));
    assert_eq!(CdcOptions::new().batch_size(0).effective_batch_size(), 1);
}

#[test]
fn test_next_timestamp_strictly_increases() {
    let mut last = Some(crate::event::now() + Duration::seconds(5));
    let first = next_timestamp(&mut last);
    let second = next_timestamp(&mut last);
    assert!(second > first);
    assert_eq!(second - first, Duration::microseconds(1));
}

#[test]
fn test_default_data_dir() {
    let dir = default_data_dir();
    assert!(dir.to_string_lossy().contains("eventide"));
}

#[tokio::test]
async fn test_backend_names() {
    let names: Vec<String> = backends()
        .await
        .iter()
        .map(|log| log.name().to_string())
        .collect();
    assert_eq!(names, vec!["memory", "sqlite"]);
}

#[tokio::test]
async fn test_sequence_is_gapless_per_entity() {
    for log in backends().await {
        for i in 0..3 {
            log.append(AppendInput::new("Contact", "a", "update").with_data(json!({"i": i})))
                .await
                .unwrap();
            log.append(AppendInput::new("Contact", "b", "update"))
                .await
                .unwrap();
            log.append(AppendInput::new("Deal", "a", "update"))
                .await
                .unwrap();
        }

        for (entity_type, entity_id) in [("Contact", "a"), ("Contact", "b"), ("Deal", "a")] {
            let sequences: Vec<i64> = log
                .entity_history(entity_type, entity_id)
                .await
                .unwrap()
                .iter()
                .map(|e| e.sequence)
                .collect();
            assert_eq!(sequences, vec![1, 2, 3], "{} {entity_type}/{entity_id}", log.name());
        }
        assert_eq!(log.size().await.unwrap(), 9);
    }
}

#[tokio::test]
async fn test_concurrent_appends_to_same_entity() {
    for log in backends().await {
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let log = log.clone();
                tokio::spawn(async move {
                    log.append(AppendInput::new("Contact", "hot", "touch"))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let sequences: Vec<i64> = log
            .entity_history("Contact", "hot")
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<i64>>(), "{}", log.name());
    }
}

#[tokio::test]
async fn test_append_assigns_fields_and_round_trips() {
    for log in backends().await {
        let appended = log
            .append(
                AppendInput::new("Contact", "c1", "qualify")
                    .with_data(json!({"reason": "budget"}))
                    .with_before(json!({"stage": "Lead"}))
                    .with_after(json!({"stage": "Qualified"}))
                    .with_context("tenant_1")
                    .with_actor("user_9"),
            )
            .await
            .unwrap();

        assert_eq!(appended.event_type, "Contact.qualified");
        assert_eq!(appended.sequence, 1);
        assert!(!appended.id.is_empty());

        let fetched = log.get(&appended.id).await.unwrap().unwrap();
        assert_eq!(fetched, appended, "{}", log.name());
    }
}

#[tokio::test]
async fn test_get_missing_is_none() {
    for log in backends().await {
        assert!(log.get("missing").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_ids_are_unique() {
    for log in backends().await {
        let a = log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        let b = log.append(AppendInput::new("B", "1", "create")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.timestamp >= a.timestamp);
    }
}

#[tokio::test]
async fn test_query_filters_and_pagination() {
    for log in backends().await {
        log.append(AppendInput::create("Contact", "c1", json!({"n": 1})))
            .await
            .unwrap();
        let middle = log
            .append(AppendInput::update("Contact", "c1", json!({}), json!({"n": 2})))
            .await
            .unwrap();
        log.append(AppendInput::create("Deal", "d1", json!({"n": 3})))
            .await
            .unwrap();
        let last = log
            .append(AppendInput::new("Contact", "c2", "create"))
            .await
            .unwrap();

        let contacts = log.query(&EventQuery::new().for_type("Contact")).await.unwrap();
        assert_eq!(contacts.len(), 3);

        let creates = log
            .query(&EventQuery::new().with_verb("create"))
            .await
            .unwrap();
        assert_eq!(creates.len(), 3);

        let one_entity = log
            .query(&EventQuery::new().for_entity("Contact", "c1"))
            .await
            .unwrap();
        assert_eq!(one_entity.len(), 2);

        let page = log
            .query(&EventQuery::new().paginate(2, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, middle.id);

        let bounded = log
            .query(&EventQuery::new().since(middle.timestamp).until(last.timestamp))
            .await
            .unwrap();
        assert_eq!(bounded.first().map(|e| e.id.as_str()), Some(middle.id.as_str()));
        assert_eq!(bounded.last().map(|e| e.id.as_str()), Some(last.id.as_str()));

        let offset_only = log
            .query(&EventQuery {
                offset: 3,
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(offset_only.len(), 1, "{}", log.name());
    }
}

#[tokio::test]
async fn test_query_orders_by_timestamp_then_sequence() {
    for log in backends().await {
        for _ in 0..5 {
            log.append(AppendInput::new("Contact", "c1", "touch"))
                .await
                .unwrap();
        }
        let events = log.query(&EventQuery::new()).await.unwrap();
        assert!(events
            .windows(2)
            .all(|w| (w[0].timestamp, w[0].sequence) <= (w[1].timestamp, w[1].sequence)));
    }
}

#[tokio::test]
async fn test_subscribers_are_notified_before_append_returns() {
    for log in backends().await {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        log.subscribe(
            "Deal.*",
            handler_fn(move |event| {
                let s = s.clone();
                async move {
                    s.lock().unwrap().push(event.event_type);
                    Ok(())
                }
            }),
        );

        log.append(AppendInput::new("Deal", "d1", "close")).await.unwrap();
        log.append(AppendInput::new("Contact", "c1", "create"))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["Deal.closed".to_string()]);
    }
}

#[tokio::test]
async fn test_failing_subscriber_does_not_fail_append() {
    for log in backends().await {
        let calls = Arc::new(AtomicUsize::new(0));
        log.subscribe(
            "*",
            handler_fn(|_event| async { Err(HandlerError::from("subscriber down")) }),
        );
        let c = calls.clone();
        log.subscribe(
            "*",
            handler_fn(move |_event| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let event = log.append(AppendInput::new("Contact", "c1", "create")).await;
        assert!(event.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    for log in backends().await {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handle = log.subscribe(
            "*",
            handler_fn(move |_event| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        assert!(handle.unsubscribe());
        log.append(AppendInput::new("A", "1", "update")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_cdc_pages_without_gaps_or_duplicates() {
    for log in backends().await {
        let mut appended = Vec::new();
        for i in 0..7 {
            let entity_type = if i % 2 == 0 { "Contact" } else { "Deal" };
            appended.push(
                log.append(AppendInput::new(entity_type, format!("e{i}"), "create"))
                    .await
                    .unwrap()
                    .id,
            );
        }

        let mut seen = Vec::new();
        let mut cursor = String::new();
        loop {
            let batch = log
                .cdc(&CdcOptions::new().after(&cursor).batch_size(3))
                .await
                .unwrap();
            seen.extend(batch.events.iter().map(|e| e.id.clone()));
            cursor = batch.cursor;
            if !batch.has_more {
                break;
            }
        }

        assert_eq!(seen, appended, "{}", log.name());

        let empty = log
            .cdc(&CdcOptions::new().after(&cursor))
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(!empty.has_more);
        assert_eq!(empty.cursor, cursor);
    }
}

#[tokio::test]
async fn test_cdc_filters() {
    for log in backends().await {
        log.append(AppendInput::new("Contact", "c1", "create"))
            .await
            .unwrap();
        log.append(AppendInput::new("Deal", "d1", "create"))
            .await
            .unwrap();
        log.append(AppendInput::new("Deal", "d1", "close"))
            .await
            .unwrap();

        let deals = log
            .cdc(&CdcOptions::new().with_types(["Deal"]))
            .await
            .unwrap();
        assert_eq!(deals.events.len(), 2);

        let closes = log
            .cdc(&CdcOptions::new().with_types(["Deal", "Contact"]).with_verbs(["close"]))
            .await
            .unwrap();
        assert_eq!(closes.events.len(), 1);
        assert_eq!(closes.events[0].event_type, "Deal.closed");
    }
}

#[tokio::test]
async fn test_cdc_since_is_inclusive() {
    for log in backends().await {
        log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        let second = log.append(AppendInput::new("A", "2", "create")).await.unwrap();

        let batch = log
            .cdc(&CdcOptions::new().since(second.timestamp))
            .await
            .unwrap();
        assert!(batch.events.iter().any(|e| e.id == second.id));

        let future = log
            .cdc(&CdcOptions::new().since(second.timestamp + Duration::hours(1)))
            .await
            .unwrap();
        assert!(future.is_empty());
        assert_eq!(future.cursor, "");
    }
}

#[tokio::test]
async fn test_sub_microsecond_bounds_agree_across_backends() {
    let mut results = Vec::new();
    for log in backends().await {
        let event = log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        let just_after = event.timestamp + Duration::nanoseconds(500);
        let just_before = event.timestamp - Duration::nanoseconds(500);

        let since = log.query(&EventQuery::new().since(just_after)).await.unwrap();
        let until = log.query(&EventQuery::new().until(just_before)).await.unwrap();
        let cdc = log.cdc(&CdcOptions::new().since(just_after)).await.unwrap();
        let inside = log
            .query(&EventQuery::new().since(just_before).until(just_after))
            .await
            .unwrap();
        results.push((since.len(), until.len(), cdc.events.len(), inside.len()));
    }

    assert_eq!(results, vec![(0, 0, 0, 1), (0, 0, 0, 1)]);
}

#[tokio::test]
async fn test_cdc_after_and_since_combine() {
    for log in backends().await {
        let first = log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        let second = log.append(AppendInput::new("A", "2", "create")).await.unwrap();
        let third = log.append(AppendInput::new("A", "3", "create")).await.unwrap();

        // since is the tighter bound
        let batch = log
            .cdc(&CdcOptions::new().after(&first.id).since(third.timestamp))
            .await
            .unwrap();
        let ids: Vec<&str> = batch.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str()], "{}", log.name());

        // cursor is the tighter bound
        let batch = log
            .cdc(&CdcOptions::new().after(&second.id).since(first.timestamp))
            .await
            .unwrap();
        let ids: Vec<&str> = batch.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str()], "{}", log.name());
        assert_eq!(batch.cursor, third.id);
        assert!(!batch.has_more);
    }
}

#[tokio::test]
async fn test_cdc_new_events_appear_in_later_polls() {
    for log in backends().await {
        log.append(AppendInput::new("A", "1", "create")).await.unwrap();
        let first = log.cdc(&CdcOptions::new()).await.unwrap();
        assert_eq!(first.events.len(), 1);

        let late = log.append(AppendInput::new("B", "1", "create")).await.unwrap();
        let second = log
            .cdc(&CdcOptions::new().after(&first.cursor))
            .await
            .unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].id, late.id);
    }
}

#[tokio::test]
async fn test_cdc_unknown_cursor_is_rejected() {
    for log in backends().await {
        let result = log.cdc(&CdcOptions::new().after("no-such-event")).await;
        assert!(matches!(result, Err(Error::InvalidCursor(_))), "{}", log.name());
    }
}

#[tokio::test]
async fn test_sqlite_schema_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.db");

    let first = SqliteEventLog::from_path(&path, SqliteOptions::default())
        .await
        .unwrap();
    first
        .append(AppendInput::new("Contact", "c1", "create"))
        .await
        .unwrap();
    drop(first);

    let second = SqliteEventLog::from_path(&path, SqliteOptions::default())
        .await
        .unwrap();
    assert_eq!(second.size().await.unwrap(), 1);
    let next = second
        .append(AppendInput::new("Contact", "c1", "update"))
        .await
        .unwrap();
    assert_eq!(next.sequence, 2);
}

#[tokio::test]
async fn test_sqlite_custom_table_name() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let log = SqliteEventLog::new(
        pool,
        SqliteOptions {
            table: "crm_events".to_string(),
            ..SqliteOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(log.table(), "crm_events");
    log.append(AppendInput::new("A", "1", "create")).await.unwrap();
    assert_eq!(log.size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sqlite_rejects_unsafe_table_name() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let result = SqliteEventLog::new(
        pool,
        SqliteOptions {
            table: "events; DROP TABLE x".to_string(),
            ..SqliteOptions::default()
        },
    )
    .await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}

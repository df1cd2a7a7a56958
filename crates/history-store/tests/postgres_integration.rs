//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need a Docker daemon,
//! so they are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p history-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use history_store::{
    AppendOptions, ExecutionId, HistoryEntry, HistoryStore, HistoryStoreError, HistoryStoreExt,
    PostgresHistoryStore, Sequence,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_workflow_history.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresHistoryStore {
    let info = get_container_info().await;

    let store = PostgresHistoryStore::connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE workflow_history")
        .execute(store.pool())
        .await
        .unwrap();

    store
}

fn create_test_entry(execution_id: ExecutionId, sequence: i64, entry_type: &str) -> HistoryEntry {
    HistoryEntry::builder()
        .execution_id(execution_id)
        .workflow_type("ProcessRedeemedBonus")
        .entry_type(entry_type)
        .sequence(Sequence::new(sequence))
        .payload_raw(serde_json::json!({"test": true}))
        .metadata("bonus_code", serde_json::json!("ABCDEFGHIJKL"))
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn append_and_load_history() {
    let store = get_test_store().await;
    let execution_id = ExecutionId::new();

    let entry = create_test_entry(execution_id, 1, "ExecutionStarted");
    let result = store.append(vec![entry], AppendOptions::expect_new()).await;
    assert_eq!(result.unwrap(), Sequence::first());

    let entries = store.load(execution_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, "ExecutionStarted");
    assert_eq!(
        entries[0].metadata.get("bonus_code"),
        Some(&serde_json::json!("ABCDEFGHIJKL"))
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn append_multiple_entries_atomically() {
    let store = get_test_store().await;
    let execution_id = ExecutionId::new();

    let entries = vec![
        create_test_entry(execution_id, 1, "ExecutionStarted"),
        create_test_entry(execution_id, 2, "StepRecorded"),
        create_test_entry(execution_id, 3, "ExecutionSucceeded"),
    ];
    let last = store
        .append(entries, AppendOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(last, Sequence::new(3));

    let stored = store.load(execution_id).await.unwrap();
    let sequences: Vec<i64> = stored.iter().map(|e| e.sequence.as_i64()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn stale_writer_gets_conflict() {
    let store = get_test_store().await;
    let execution_id = ExecutionId::new();

    store
        .append_entry(create_test_entry(execution_id, 1, "ExecutionStarted"))
        .await
        .unwrap();

    let result = store
        .append(
            vec![create_test_entry(execution_id, 1, "ExecutionStarted")],
            AppendOptions::expect_new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(HistoryStoreError::ConcurrencyConflict { .. })
    ));
    assert_eq!(
        store.current_sequence(execution_id).await.unwrap(),
        Some(Sequence::first())
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn unique_constraint_maps_to_conflict() {
    let store = get_test_store().await;
    let execution_id = ExecutionId::new();

    store
        .append(
            vec![create_test_entry(execution_id, 1, "ExecutionStarted")],
            AppendOptions::new(),
        )
        .await
        .unwrap();

    // No expected sequence: only the (execution_id, sequence) constraint guards the write
    let result = store
        .append(
            vec![create_test_entry(execution_id, 1, "ExecutionStarted")],
            AppendOptions::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(HistoryStoreError::ConcurrencyConflict { .. })
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn load_from_and_list_executions() {
    let store = get_test_store().await;
    let first = ExecutionId::new();
    let second = ExecutionId::new();

    store
        .append(
            vec![
                create_test_entry(first, 1, "ExecutionStarted"),
                create_test_entry(first, 2, "StepRecorded"),
                create_test_entry(first, 3, "StepRecorded"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    store
        .append(
            vec![create_test_entry(second, 1, "ExecutionStarted")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let tail = store.load_from(first, Sequence::new(2)).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].sequence, Sequence::new(2));

    let mut ids = store.list_executions().await.unwrap();
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);

    let started = store.entries_by_type("ExecutionStarted").await.unwrap();
    assert_eq!(started.len(), 2);
}

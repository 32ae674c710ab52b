//! PostgreSQL integration tests for the idempotency store.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p idempotency --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::IdempotencyKey;
use idempotency::{
    GuardConfig, IdempotencyError, IdempotencyGuard, IdempotencyRecord, IdempotencyStore,
    PostgresIdempotencyStore, StoredResponse,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const TTL: Duration = Duration::from_secs(60);

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
                "../../../migrations/002_create_idempotency_keys.sql"
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

async fn get_test_store() -> PostgresIdempotencyStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE idempotency_keys")
        .execute(&pool)
        .await
        .unwrap();

    PostgresIdempotencyStore::new(pool)
}

fn completed(id: u32) -> IdempotencyRecord {
    IdempotencyRecord::completed(StoredResponse::new(201, serde_json::json!({ "id": id })))
}

#[derive(Debug)]
enum TestError {
    #[allow(dead_code)]
    Guard(IdempotencyError),
}

impl From<IdempotencyError> for TestError {
    fn from(e: IdempotencyError) -> Self {
        TestError::Guard(e)
    }
}

#[tokio::test]
async fn test_put_if_absent_respects_live_rows() {
    let store = get_test_store().await;
    let key = IdempotencyKey::new();

    assert!(
        store
            .put_if_absent(key, IdempotencyRecord::in_flight(), TTL)
            .await
            .unwrap()
    );
    assert!(!store.put_if_absent(key, completed(1), TTL).await.unwrap());

    let record = store.get_if_present(key).await.unwrap().unwrap();
    assert!(!record.is_completed());
}

#[tokio::test]
async fn test_expired_row_is_absent_and_replaceable() {
    let store = get_test_store().await;
    let key = IdempotencyKey::new();

    store
        .put(key, completed(1), Duration::from_millis(10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.get_if_present(key).await.unwrap().is_none());
    assert!(store.put_if_absent(key, completed(2), TTL).await.unwrap());

    let record = store.get_if_present(key).await.unwrap().unwrap();
    assert_eq!(
        record.into_response().unwrap().body,
        serde_json::json!({ "id": 2 })
    );
}

#[tokio::test]
async fn test_put_overwrites_and_remove_deletes() {
    let store = get_test_store().await;
    let key = IdempotencyKey::new();

    store
        .put(key, IdempotencyRecord::in_flight(), TTL)
        .await
        .unwrap();
    store.put(key, completed(1), TTL).await.unwrap();
    assert!(store.get_if_present(key).await.unwrap().unwrap().is_completed());

    store.remove(key).await.unwrap();
    assert!(store.get_if_present(key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_purge_expired() {
    let store = get_test_store().await;
    store
        .put(IdempotencyKey::new(), completed(1), Duration::from_millis(10))
        .await
        .unwrap();
    store
        .put(IdempotencyKey::new(), completed(2), TTL)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.purge_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() {
    let store = get_test_store().await;
    let key = IdempotencyKey::new();

    let attempts = (0..10).map(|_| {
        let store = store.clone();
        async move {
            store
                .put_if_absent(key, IdempotencyRecord::in_flight(), TTL)
                .await
                .unwrap()
        }
    });
    let results = futures_util::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|won| **won).count(), 1);
}

#[tokio::test]
async fn test_guard_over_postgres_runs_once() {
    let store = get_test_store().await;
    let guard = IdempotencyGuard::new(store, GuardConfig::default());
    let key = IdempotencyKey::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let guard = guard.clone();
        let runs = runs.clone();
        handles.push(tokio::spawn(async move {
            guard
                .execute(Some(key), || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, TestError>(StoredResponse::new(201, serde_json::json!("done")))
                })
                .await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.response().status, 201);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

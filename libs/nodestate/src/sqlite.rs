//! SQLite-backed store.
//!
//! Several processes may open the same database file; WAL mode plus a busy
//! timeout lets them interleave, and each write is a single conditional
//! statement so the version check and the write are atomic.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fakedra_api::NodeAllocationState;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::{NodeStateStore, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite state store.
#[derive(Clone)]
pub struct SqliteNodeStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNodeStateStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode so the controller and the plugins can share the file
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Self::with_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS node_allocation_states (
            namespace TEXT NOT NULL,
            name TEXT NOT NULL,
            resource_version INTEGER NOT NULL,
            object TEXT NOT NULL,
            PRIMARY KEY (namespace, name)
        );
        "#,
    )?;

    debug!("NodeAllocationState schema initialized");
    Ok(())
}

fn current_version(conn: &Connection, namespace: &str, name: &str) -> Result<Option<u64>, StoreError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT resource_version FROM node_allocation_states WHERE namespace = ?1 AND name = ?2",
            params![namespace, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.map(|v| v as u64))
}

#[async_trait]
impl NodeStateStore for SqliteNodeStateStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<NodeAllocationState, StoreError> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        self.run(move |conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT resource_version, object FROM node_allocation_states WHERE namespace = ?1 AND name = ?2",
                    params![namespace, name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((version, object)) = row else {
                return Err(StoreError::not_found(&namespace, &name));
            };

            let mut nas: NodeAllocationState = serde_json::from_str(&object)?;
            nas.metadata.resource_version = version as u64;
            Ok(nas)
        })
        .await
    }

    async fn create(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        let mut stored = nas.clone();
        stored.metadata.resource_version = 1;
        self.run(move |conn| {
            let object = serde_json::to_string(&stored)?;
            let result = conn.execute(
                "INSERT INTO node_allocation_states (namespace, name, resource_version, object) VALUES (?1, ?2, ?3, ?4)",
                params![stored.namespace(), stored.name(), 1i64, object],
            );

            match result {
                Ok(_) => Ok(stored),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::AlreadyExists {
                        namespace: stored.namespace().to_string(),
                        name: stored.name().to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        let expected = nas.resource_version();
        let mut stored = nas.clone();
        stored.metadata.resource_version = expected + 1;
        self.run(move |conn| {
            let object = serde_json::to_string(&stored)?;
            let changed = conn.execute(
                r#"
                UPDATE node_allocation_states
                SET resource_version = ?1, object = ?2
                WHERE namespace = ?3 AND name = ?4 AND resource_version = ?5
                "#,
                params![
                    stored.resource_version() as i64,
                    object,
                    stored.namespace(),
                    stored.name(),
                    expected as i64,
                ],
            )?;

            if changed == 1 {
                return Ok(stored);
            }

            match current_version(conn, stored.namespace(), stored.name())? {
                Some(actual) => Err(StoreError::Conflict {
                    namespace: stored.namespace().to_string(),
                    name: stored.name().to_string(),
                    expected,
                    actual,
                }),
                None => Err(StoreError::not_found(stored.namespace(), stored.name())),
            }
        })
        .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "DELETE FROM node_allocation_states WHERE namespace = ?1 AND name = ?2",
                params![namespace, name],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found(&namespace, &name));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedra_api::NodeAllocationStateStatus;

    #[tokio::test]
    async fn test_sqlite_create_get() {
        let store = SqliteNodeStateStore::open_in_memory().unwrap();
        let mut nas = NodeAllocationState::new("node-a", "default");
        nas.status = NodeAllocationStateStatus::Ready;

        let created = store.create(&nas).await.unwrap();
        assert_eq!(created.resource_version(), 1);

        let fetched = store.get("default", "node-a").await.unwrap();
        assert_eq!(fetched, created);

        let err = store.create(&nas).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_conditional_update() {
        let store = SqliteNodeStateStore::open_in_memory().unwrap();
        let created = store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap();

        let mut next = created.clone();
        next.status = NodeAllocationStateStatus::Ready;
        let updated = store.update(&next).await.unwrap();
        assert_eq!(updated.resource_version(), 2);

        match store.update(&created).await.unwrap_err() {
            StoreError::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let store = SqliteNodeStateStore::open_in_memory().unwrap();
        store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap();

        store.delete("default", "node-a").await.unwrap();
        assert!(store.get("default", "node-a").await.unwrap_err().is_not_found());
        assert!(store.delete("default", "node-a").await.unwrap_err().is_not_found());
        assert!(store
            .update(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}

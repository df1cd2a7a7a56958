use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EntryId, ExecutionId, HistoryEntry, HistoryStoreError, Result, Sequence,
    store::{AppendOptions, HistoryStore, validate_entries_for_append},
};

const SELECT_COLUMNS: &str =
    "id, entry_type, execution_id, workflow_type, sequence, recorded_at, payload, metadata";

/// PostgreSQL-backed history store.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Creates a new PostgreSQL history store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<HistoryEntry> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(HistoryEntry {
            entry_id: EntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            entry_type: row.try_get("entry_type")?,
            execution_id: ExecutionId::from_uuid(row.try_get::<Uuid, _>("execution_id")?),
            workflow_type: row.try_get("workflow_type")?,
            sequence: Sequence::new(row.try_get("sequence")?),
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(
        &self,
        entries: Vec<HistoryEntry>,
        options: AppendOptions,
    ) -> Result<Sequence> {
        validate_entries_for_append(&entries)?;

        let execution_id = entries[0].execution_id;

        let mut tx = self.pool.begin().await?;

        if let Some(expected) = options.expected_sequence {
            let current: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(sequence) FROM workflow_history WHERE execution_id = $1",
            )
            .bind(execution_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;

            let actual = Sequence::new(current.unwrap_or(0));
            if actual != expected {
                return Err(HistoryStoreError::ConcurrencyConflict {
                    execution_id,
                    expected,
                    actual,
                });
            }
        }

        let mut last = Sequence::initial();
        for entry in &entries {
            let metadata_json = serde_json::to_value(&entry.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO workflow_history (id, entry_type, execution_id, workflow_type, sequence, recorded_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.entry_id.as_uuid())
            .bind(&entry.entry_type)
            .bind(entry.execution_id.as_uuid())
            .bind(&entry.workflow_type)
            .bind(entry.sequence.as_i64())
            .bind(entry.recorded_at)
            .bind(&entry.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer won the race for this sequence
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_execution_sequence")
                {
                    return HistoryStoreError::ConcurrencyConflict {
                        execution_id,
                        expected: options.expected_sequence.unwrap_or(Sequence::initial()),
                        actual: entry.sequence,
                    };
                }
                HistoryStoreError::Database(e)
            })?;

            last = entry.sequence;
        }

        tx.commit().await?;
        metrics::counter!("history_entries_appended_total").increment(entries.len() as u64);
        tracing::debug!(%execution_id, sequence = %last, "history appended");
        Ok(last)
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_history WHERE execution_id = $1 ORDER BY sequence ASC"
        ))
        .bind(execution_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn load_from(
        &self,
        execution_id: ExecutionId,
        from_sequence: Sequence,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_history WHERE execution_id = $1 AND sequence >= $2 ORDER BY sequence ASC"
        ))
        .bind(execution_id.as_uuid())
        .bind(from_sequence.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn entries_by_type(&self, entry_type: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_history WHERE entry_type = $1 ORDER BY recorded_at ASC, sequence ASC"
        ))
        .bind(entry_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT execution_id FROM workflow_history ORDER BY execution_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ExecutionId::from_uuid).collect())
    }

    async fn current_sequence(&self, execution_id: ExecutionId) -> Result<Option<Sequence>> {
        let sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM workflow_history WHERE execution_id = $1")
                .bind(execution_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(sequence.map(Sequence::new))
    }
}

//! SqliteEventLog - SQLite-based event log

use super::helpers::{db_error, row_to_event, to_json_text, validate_table_name, EVENT_COLUMNS};
use super::query::{CdcBatch, CdcOptions, EventQuery};
use super::traits::EventLog;
use super::{new_event_id, next_timestamp};
use crate::error::{Error, Result};
use crate::event::{format_timestamp, AppendInput, Event};
use crate::handler::{EventHandler, SubscriberRegistry, Unsubscribe};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Default event table name
pub const DEFAULT_TABLE: &str = "event_log";

/// Options for the SQLite backend
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Event table name
    pub table: String,
    /// Pool size for file-backed databases
    pub max_connections: u32,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            max_connections: 5,
        }
    }
}

/// Event log persisted to a single SQLite table
///
/// The per-entity sequence is computed inside the insert statement and a
/// unique index on `(entity_type, entity_id, sequence)` backs it up. Appends
/// from this process pass through a write gate so commit order matches
/// `(timestamp, id)` order, which CDC cursors rely on.
#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
    table: String,
    write_gate: Arc<Mutex<Option<DateTime<Utc>>>>,
    subscribers: SubscriberRegistry,
}

impl SqliteEventLog {
    /// Create a log over an existing pool, creating the schema if needed
    pub async fn new(pool: SqlitePool, options: SqliteOptions) -> Result<Self> {
        validate_table_name(&options.table)?;

        let log = Self {
            pool,
            table: options.table,
            write_gate: Arc::new(Mutex::new(None)),
            subscribers: SubscriberRegistry::new(),
        };
        log.create_schema().await?;
        Ok(log)
    }

    /// Create a log from a database path
    ///
    /// This will create the database file if it doesn't exist.
    pub async fn from_path(db_path: &Path, options: SqliteOptions) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect(&db_url)
            .await
            .map_err(db_error)?;

        let log = Self::new(pool, options).await?;
        info!("SQLite event log initialized at {}", db_path.display());
        Ok(log)
    }

    /// Create a new in-memory SQLite log (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;

        let log = Self::new(pool, SqliteOptions::default()).await?;
        debug!("In-memory SQLite event log initialized");
        Ok(log)
    }

    /// Get a reference to the underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Event table name
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table and indexes; safe to run repeatedly
    async fn create_schema(&self) -> Result<()> {
        let table = &self.table;
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    type TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    verb TEXT NOT NULL,
                    conjugation_action TEXT NOT NULL,
                    conjugation_activity TEXT NOT NULL,
                    conjugation_event TEXT NOT NULL,
                    data TEXT,
                    before_state TEXT,
                    after_state TEXT,
                    context TEXT,
                    actor TEXT,
                    sequence INTEGER NOT NULL,
                    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                )
                "#
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_entity ON {table}(entity_type, entity_id)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}(timestamp)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_verb ON {table}(verb)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_type ON {table}(type)"),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_entity_sequence \
                 ON {table}(entity_type, entity_id, sequence)"
            ),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        debug!(table = %self.table, "Event log schema ready");
        Ok(())
    }

    async fn insert(&self, input: AppendInput) -> Result<Event> {
        let mut last_timestamp = self.write_gate.lock().await;
        let id = new_event_id();
        let timestamp = next_timestamp(&mut last_timestamp);

        let sql = format!(
            r#"
            INSERT INTO {table} (
                id, type, entity_type, entity_id, verb,
                conjugation_action, conjugation_activity, conjugation_event,
                data, before_state, after_state, context, actor,
                sequence, timestamp
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                   COALESCE(MAX(sequence), 0) + 1, ?14
            FROM {table}
            WHERE entity_type = ?3 AND entity_id = ?4
            RETURNING sequence
            "#,
            table = self.table
        );

        let sequence: i64 = sqlx::query_scalar(&sql)
            .bind(&id)
            .bind(input.event_type())
            .bind(&input.entity_type)
            .bind(&input.entity_id)
            .bind(&input.verb)
            .bind(&input.conjugation.action)
            .bind(&input.conjugation.activity)
            .bind(&input.conjugation.event)
            .bind(to_json_text(input.data.as_ref()))
            .bind(to_json_text(input.before.as_ref()))
            .bind(to_json_text(input.after.as_ref()))
            .bind(&input.context)
            .bind(&input.actor)
            .bind(format_timestamp(&timestamp))
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        drop(last_timestamp);
        Ok(Event::from_input(input, id, sequence, timestamp))
    }

    fn select(&self) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM {} WHERE 1 = 1",
            self.table
        ))
    }
}

#[async_trait::async_trait]
impl EventLog for SqliteEventLog {
    #[instrument(skip(self, input), fields(entity_type = %input.entity_type, entity_id = %input.entity_id, verb = %input.verb))]
    async fn append(&self, input: AppendInput) -> Result<Event> {
        let event = self.insert(input).await?;
        debug!(
            event_id = %event.id,
            sequence = event.sequence,
            "Appended event {}",
            event.event_type
        );

        self.subscribers.notify(&event).await;
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<Event>> {
        let mut builder = self.select();
        builder.push(" AND id = ").push_bind(id.to_string());

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_to_event).transpose()
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut builder = self.select();
        if let Some(entity_type) = &query.entity_type {
            builder
                .push(" AND entity_type = ")
                .push_bind(entity_type.clone());
        }
        if let Some(entity_id) = &query.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(verb) = &query.verb {
            builder.push(" AND verb = ").push_bind(verb.clone());
        }
        if let Some(since) = query.since_bound() {
            builder
                .push(" AND timestamp >= ")
                .push_bind(format_timestamp(&since));
        }
        if let Some(until) = query.until_bound() {
            builder
                .push(" AND timestamp <= ")
                .push_bind(format_timestamp(&until));
        }

        builder.push(" ORDER BY timestamp ASC, sequence ASC LIMIT ");
        match query.limit {
            Some(limit) => builder.push_bind(limit as i64),
            None => builder.push("-1"),
        };
        builder.push(" OFFSET ").push_bind(query.offset as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self))]
    async fn entity_history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let mut builder = self.select();
        builder
            .push(" AND entity_type = ")
            .push_bind(entity_type.to_string())
            .push(" AND entity_id = ")
            .push_bind(entity_id.to_string())
            .push(" ORDER BY sequence ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(row_to_event).collect()
    }

    fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe {
        self.subscribers.subscribe(pattern, handler)
    }

    async fn size(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    #[instrument(skip(self))]
    async fn cdc(&self, options: &CdcOptions) -> Result<CdcBatch> {
        let mut builder = self.select();

        if let Some(cursor) = options.after.as_deref() {
            let sql = format!("SELECT timestamp FROM {} WHERE id = ?1", self.table);
            let anchor: String = sqlx::query_scalar(&sql)
                .bind(cursor)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .ok_or_else(|| Error::InvalidCursor(cursor.to_string()))?;

            builder
                .push(" AND (timestamp > ")
                .push_bind(anchor.clone())
                .push(" OR (timestamp = ")
                .push_bind(anchor)
                .push(" AND id > ")
                .push_bind(cursor.to_string())
                .push("))");
        }
        if let Some(since) = options.since_bound() {
            builder
                .push(" AND timestamp >= ")
                .push_bind(format_timestamp(&since));
        }
        if !options.types.is_empty() {
            builder.push(" AND entity_type IN (");
            let mut separated = builder.separated(", ");
            for entity_type in &options.types {
                separated.push_bind(entity_type.clone());
            }
            separated.push_unseparated(")");
        }
        if !options.verbs.is_empty() {
            builder.push(" AND verb IN (");
            let mut separated = builder.separated(", ");
            for verb in &options.verbs {
                separated.push_bind(verb.clone());
            }
            separated.push_unseparated(")");
        }

        builder
            .push(" ORDER BY timestamp ASC, id ASC LIMIT ")
            .push_bind((options.effective_batch_size() + 1) as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        let candidates = rows.iter().map(row_to_event).collect::<Result<Vec<_>>>()?;

        Ok(CdcBatch::from_candidates(candidates, options))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

//! SQLite-backed call store
//!
//! Timestamps are stored as epoch milliseconds so that range filters compare
//! numerically; `analysis` and `metadata` are JSON text.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use super::CallStore;
use crate::changeset::ChangeSet;
use crate::status::{CallStatus, ACTIVE_STATUSES, STALE_ELIGIBLE_STATUSES};
use crate::types::{Call, JsonMap};
use crate::{CallError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calls (
    id                TEXT PRIMARY KEY,
    owner_id          TEXT NOT NULL,
    contact_id        TEXT NOT NULL,
    script_id         TEXT,
    provider_call_id  TEXT UNIQUE,
    assistant_id      TEXT NOT NULL,
    phone_line_id     TEXT,
    status            TEXT NOT NULL,
    outcome           TEXT,
    error_message     TEXT,
    transcript        TEXT,
    summary           TEXT,
    analysis          TEXT,
    started_at        INTEGER,
    ended_at          INTEGER,
    duration_seconds  INTEGER,
    metadata          TEXT NOT NULL DEFAULT '{}',
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_calls_owner_status ON calls (owner_id, status);
CREATE INDEX IF NOT EXISTS idx_calls_status_created ON calls (status, created_at);
"#;

macro_rules! call_columns {
    () => {
        "id, owner_id, contact_id, script_id, provider_call_id, assistant_id, phone_line_id, \
         status, outcome, error_message, transcript, summary, analysis, started_at, ended_at, \
         duration_seconds, metadata, created_at, updated_at"
    };
}

const SELECT_CALL: &str = concat!("SELECT ", call_columns!(), " FROM calls");
const RETURNING_CALL: &str = concat!(" RETURNING ", call_columns!());

/// Characters `str::trim` would strip from stored text
const BLANK_CHARS: &str = " \t\n\r";

/// Call store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteCallStore {
    pool: SqlitePool,
}

/// Raw `calls` row
#[derive(sqlx::FromRow, Debug)]
struct CallRow {
    id: String,
    owner_id: String,
    contact_id: String,
    script_id: Option<String>,
    provider_call_id: Option<String>,
    assistant_id: String,
    phone_line_id: Option<String>,
    status: String,
    outcome: Option<String>,
    error_message: Option<String>,
    transcript: Option<String>,
    summary: Option<String>,
    analysis: Option<String>,
    started_at: Option<i64>,
    ended_at: Option<i64>,
    duration_seconds: Option<i64>,
    metadata: String,
    created_at: i64,
    updated_at: i64,
}

impl SqliteCallStore {
    /// Connect to `database_url` and create the schema if needed
    pub async fn new(database_url: &str) -> Result<Self> {
        // every connection to :memory: is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Call store ready at {}", database_url);
        Ok(store)
    }

    /// Wrap an existing pool; the schema is created if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> Result<Option<Call>> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_CALL);
        query.push(" WHERE ").push(column).push(" = ").push_bind(value);
        let row = query
            .build_query_as::<CallRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(Call::try_from).transpose()
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| CallError::internal(format!("Invalid stored timestamp: {}", millis)))
}

fn encode_map(map: &JsonMap) -> Result<String> {
    Ok(serde_json::to_string(map)?)
}

fn decode_map(text: &str) -> Result<JsonMap> {
    Ok(serde_json::from_str(text)?)
}

impl TryFrom<CallRow> for Call {
    type Error = CallError;

    fn try_from(row: CallRow) -> Result<Self> {
        Ok(Call {
            id: row.id,
            owner_id: row.owner_id,
            contact_id: row.contact_id,
            script_id: row.script_id,
            provider_call_id: row.provider_call_id,
            assistant_id: row.assistant_id,
            phone_line_id: row.phone_line_id,
            status: row.status.parse()?,
            outcome: row.outcome,
            error_message: row.error_message,
            transcript: row.transcript,
            summary: row.summary,
            analysis: row.analysis.as_deref().map(decode_map).transpose()?,
            started_at: row.started_at.map(from_millis).transpose()?,
            ended_at: row.ended_at.map(from_millis).transpose()?,
            duration_seconds: row.duration_seconds,
            metadata: decode_map(&row.metadata)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

fn push_status_list(query: &mut QueryBuilder<'_, Sqlite>, statuses: &[CallStatus]) {
    query.push("(");
    let mut separated = query.separated(", ");
    for status in statuses {
        separated.push_bind(status.as_str());
    }
    separated.push_unseparated(")");
}

/// Lattice order of the row's current status
fn push_status_order(query: &mut QueryBuilder<'_, Sqlite>) {
    query.push("(CASE status");
    for status in CallStatus::all() {
        query
            .push(" WHEN ")
            .push_bind(status.as_str())
            .push(" THEN ")
            .push_bind(i64::from(status.order()));
    }
    query.push(" END)");
}

/// `column = value` only while the stored text is empty or whitespace
fn push_if_blank(query: &mut QueryBuilder<'_, Sqlite>, column: &'static str, value: String) {
    query
        .push(", ")
        .push(column)
        .push(" = CASE WHEN COALESCE(TRIM(")
        .push(column)
        .push(", ")
        .push_bind(BLANK_CHARS)
        .push("), '') = '' THEN ")
        .push_bind(value)
        .push(" ELSE ")
        .push(column)
        .push(" END");
}

#[async_trait]
impl CallStore for SqliteCallStore {
    async fn insert_call(&self, call: &Call) -> Result<()> {
        let analysis = call.analysis.as_ref().map(encode_map).transpose()?;
        let metadata = encode_map(&call.metadata)?;

        sqlx::query(
            "INSERT INTO calls (id, owner_id, contact_id, script_id, provider_call_id, \
             assistant_id, phone_line_id, status, outcome, error_message, transcript, summary, \
             analysis, started_at, ended_at, duration_seconds, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&call.id)
        .bind(&call.owner_id)
        .bind(&call.contact_id)
        .bind(&call.script_id)
        .bind(&call.provider_call_id)
        .bind(&call.assistant_id)
        .bind(&call.phone_line_id)
        .bind(call.status.as_str())
        .bind(&call.outcome)
        .bind(&call.error_message)
        .bind(&call.transcript)
        .bind(&call.summary)
        .bind(analysis)
        .bind(call.started_at.map(to_millis))
        .bind(call.ended_at.map(to_millis))
        .bind(call.duration_seconds)
        .bind(metadata)
        .bind(to_millis(call.created_at))
        .bind(to_millis(call.updated_at))
        .execute(&self.pool)
        .await?;

        debug!("Inserted call {} ({})", call.id, call.status);
        Ok(())
    }

    async fn get_call(&self, owner_id: &str, call_id: &str) -> Result<Option<Call>> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_CALL);
        query
            .push(" WHERE id = ")
            .push_bind(call_id)
            .push(" AND owner_id = ")
            .push_bind(owner_id);
        let row = query
            .build_query_as::<CallRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(Call::try_from).transpose()
    }

    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> Result<Option<Call>> {
        self.fetch_one_where("provider_call_id", provider_call_id).await
    }

    async fn apply_changes(
        &self,
        call_id: &str,
        changes: &ChangeSet,
        updated_at: DateTime<Utc>,
    ) -> Result<Call> {
        if changes.is_empty() {
            return self
                .fetch_one_where("id", call_id)
                .await?
                .ok_or_else(|| CallError::call_not_found(call_id));
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE calls SET updated_at = ");
        query.push_bind(to_millis(updated_at));
        if let Some(status) = changes.status {
            query.push(", status = CASE WHEN ");
            push_status_order(&mut query);
            query
                .push(" < ")
                .push_bind(i64::from(status.order()))
                .push(" THEN ")
                .push_bind(status.as_str())
                .push(" ELSE status END");
        }
        if let Some(transcript) = &changes.transcript {
            push_if_blank(&mut query, "transcript", transcript.clone());
        }
        if let Some(summary) = &changes.summary {
            push_if_blank(&mut query, "summary", summary.clone());
        }
        if let Some(analysis) = &changes.analysis {
            query
                .push(", analysis = CASE WHEN analysis IS NULL OR analysis IN ('', '{}') THEN ")
                .push_bind(encode_map(analysis)?)
                .push(" ELSE analysis END");
        }
        if let Some(metadata) = &changes.metadata {
            query.push(", metadata = ").push_bind(encode_map(metadata)?);
        }
        if let Some(started_at) = changes.started_at {
            query
                .push(", started_at = COALESCE(started_at, ")
                .push_bind(to_millis(started_at))
                .push(")");
        }
        if let Some(ended_at) = changes.ended_at {
            query
                .push(", ended_at = COALESCE(ended_at, ")
                .push_bind(to_millis(ended_at))
                .push(")");
        }
        if let Some(duration) = changes.duration_seconds {
            query
                .push(", duration_seconds = COALESCE(duration_seconds, ")
                .push_bind(duration)
                .push(")");
        }
        query.push(" WHERE id = ").push_bind(call_id);
        query.push(RETURNING_CALL);

        let row = query
            .build_query_as::<CallRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CallError::call_not_found(call_id))?;
        Call::try_from(row)
    }

    async fn link_provider(
        &self,
        call_id: &str,
        provider_call_id: &str,
        status: CallStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE calls SET provider_call_id = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(provider_call_id)
        .bind(status.as_str())
        .bind(to_millis(Utc::now()))
        .bind(call_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CallError::call_not_found(call_id));
        }
        Ok(())
    }

    async fn mark_failed(&self, call_id: &str, error_message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE calls SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(CallStatus::Failed.as_str())
        .bind(error_message)
        .bind(to_millis(Utc::now()))
        .bind(call_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CallError::call_not_found(call_id));
        }
        Ok(())
    }

    async fn set_status(&self, call_id: &str, status: CallStatus) -> Result<()> {
        let result = sqlx::query("UPDATE calls SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_millis(Utc::now()))
            .bind(call_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CallError::call_not_found(call_id));
        }
        Ok(())
    }

    async fn count_active_calls(&self, owner_id: &str) -> Result<u64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM calls WHERE owner_id = ");
        query.push_bind(owner_id).push(" AND status IN ");
        push_status_list(&mut query, &ACTIVE_STATUSES);

        let count = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_queued_for_sync(&self, cutoff: DateTime<Utc>) -> Result<Vec<Call>> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_CALL);
        query
            .push(" WHERE status = ")
            .push_bind(CallStatus::Queued.as_str())
            .push(" AND created_at < ")
            .push_bind(to_millis(cutoff))
            .push(" AND provider_call_id IS NOT NULL AND provider_call_id != ''")
            .push(" ORDER BY created_at");

        let rows = query
            .build_query_as::<CallRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Call::try_from).collect()
    }

    async fn fail_stale_calls(&self, cutoff: DateTime<Utc>, error_message: &str) -> Result<u64> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE calls SET status = ");
        query
            .push_bind(CallStatus::Failed.as_str())
            .push(", error_message = ")
            .push_bind(error_message)
            .push(", updated_at = ")
            .push_bind(to_millis(Utc::now()))
            .push(" WHERE created_at < ")
            .push_bind(to_millis(cutoff))
            .push(" AND status IN ");
        push_status_list(&mut query, &STALE_ELIGIBLE_STATUSES);

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

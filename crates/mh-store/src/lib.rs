//! Queue Store — the durable work queue backing the mention harness.
//!
//! Two tables, four operations: `enqueue`, `claim`, `complete`, `sweep`.
//! `claim` is the one operation with a correctness-critical shape: the
//! select-and-update must happen inside a single statement using
//! `FOR UPDATE SKIP LOCKED`, or two workers can observe the same row as
//! eligible before either commits (spec.md §4.1 "Claim atomicity").

use chrono::{DateTime, Utc};
use mh_schemas::{Event, EventId, HistoryEvent};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

pub const ENV_DB_URL: &str = "MH_DATABASE_URL";

/// The single error kind storage operations surface (spec.md §4.1, §7 kind 5).
/// Callers don't get to distinguish connection loss from a constraint
/// violation — retry is handled by the claim lifecycle (visibility expiry),
/// not by inspecting this error.
#[derive(Debug, Error)]
#[error("queue store unavailable: {context}")]
pub struct StoreError {
    context: &'static str,
    #[source]
    source: sqlx::Error,
}

impl StoreError {
    fn new(context: &'static str, source: sqlx::Error) -> Self {
        Self { context, source }
    }
}

type Result<T> = std::result::Result<T, StoreError>;

/// Connect to Postgres using `MH_DATABASE_URL`, with `max_connections`
/// supplied by the caller (normally from `mh_config::DbConfig`).
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| StoreError::new("connect", e))
}

/// Run the embedded migrations. Schema/migration *tooling* (the CLI that
/// drives this across environments) is out of scope per spec.md §1; this
/// function is the one piece of migration machinery the harness itself
/// needs at startup and in tests.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::new("migrate", e.into()))
}

/// Insert a new active row. `occurred_at` is the originating platform
/// event's timestamp (already converted via `mh_schemas::to_absolute_time`
/// at the ingress boundary); `attempts` starts at 0, `visible_at` at
/// insertion time, `claimed_at` empty (spec.md §3 Lifecycle).
pub async fn enqueue(pool: &PgPool, kind: &str, occurred_at: DateTime<Utc>, payload: Value) -> Result<EventId> {
    let row = sqlx::query(
        r#"
        insert into active (occurred_at, attempts, visible_at, claimed_at, kind, payload)
        values ($1, 0, now(), '{}', $2, $3)
        returning id
        "#,
    )
    .bind(occurred_at)
    .bind(kind)
    .bind(&payload)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::new("enqueue", e))?;

    let id: i64 = row.try_get("id").map_err(|e| StoreError::new("enqueue", e))?;
    Ok(EventId(id))
}

/// Atomically claim one eligible row.
///
/// Eligibility is I4: `attempts < max_attempts` and `visible_at <= now()`.
/// Among eligible rows the choice is uniform-random (P8, spec.md §4.1
/// "Claim ordering policy"), and `FOR UPDATE SKIP LOCKED` guarantees two
/// concurrent callers never select the same row (I1/P2). `clock_timestamp()`
/// — not `now()`, which is frozen for the whole transaction — is used so
/// that two claims committed back to back still get distinct `claimed_at`
/// entries.
pub async fn claim(
    pool: &PgPool,
    max_attempts: i32,
    lease_duration: std::time::Duration,
) -> Result<Option<Event>> {
    let lease_secs = lease_duration.as_secs_f64();

    let row = sqlx::query(
        r#"
        with candidate as (
            select id
            from active
            where attempts < $1
              and visible_at <= clock_timestamp()
            order by random()
            limit 1
            for update skip locked
        )
        update active
           set attempts   = active.attempts + 1,
               visible_at = clock_timestamp() + make_interval(secs => $2),
               claimed_at = array_append(active.claimed_at, clock_timestamp())
         where active.id in (select id from candidate)
        returning id, occurred_at, attempts, visible_at, claimed_at, kind, payload
        "#,
    )
    .bind(max_attempts)
    .bind(lease_secs)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::new("claim", e))?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(event_from_row(&row).map_err(|e| StoreError::new("claim", e))?))
}

/// Move a claimed row from `active` into `history` (I3: the move is
/// atomic, a row is never visible in both tables). `processed` records
/// whether the processor reported success.
pub async fn complete(pool: &PgPool, id: EventId, processed: bool) -> Result<bool> {
    let row = sqlx::query(
        r#"
        with moved as (
            delete from active where id = $1
            returning id, occurred_at, attempts, visible_at, claimed_at, kind, payload
        )
        insert into history (id, occurred_at, attempts, visible_at, claimed_at, kind, payload, processed)
        select id, occurred_at, attempts, visible_at, claimed_at, kind, payload, $2
        from moved
        returning id
        "#,
    )
    .bind(id.0)
    .bind(processed)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::new("complete", e))?;

    Ok(row.is_some())
}

/// Archive every active row that has exhausted its attempts or aged past
/// `max_age`, marking each `processed = false` (spec.md §4.1, §7 kinds
/// 3/4). Returns the number of rows archived; callers typically log this
/// only when nonzero (sweeps are frequent and mostly no-ops).
pub async fn sweep(pool: &PgPool, max_attempts: i32, max_age: std::time::Duration) -> Result<usize> {
    let max_age_secs = max_age.as_secs_f64();

    let rows = sqlx::query(
        r#"
        with moved as (
            delete from active
             where attempts >= $1
                or visible_at <= (clock_timestamp() - make_interval(secs => $2))
            returning id, occurred_at, attempts, visible_at, claimed_at, kind, payload
        )
        insert into history (id, occurred_at, attempts, visible_at, claimed_at, kind, payload, processed)
        select id, occurred_at, attempts, visible_at, claimed_at, kind, payload, false
        from moved
        returning id
        "#,
    )
    .bind(max_attempts)
    .bind(max_age_secs)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::new("sweep", e))?;

    let swept = rows.len();
    if swept > 0 {
        tracing::info!(swept, "sweep archived expired/exhausted rows");
    } else {
        tracing::debug!("sweep found nothing to archive");
    }
    Ok(swept)
}

/// Fetch a history row by id. Used by tests and by any operator tooling
/// that wants to inspect a terminal event's disposition.
pub async fn fetch_history(pool: &PgPool, id: EventId) -> Result<Option<HistoryEvent>> {
    let row = sqlx::query(
        r#"
        select id, occurred_at, attempts, visible_at, claimed_at, kind, payload, processed
        from history
        where id = $1
        "#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::new("fetch_history", e))?;

    let Some(row) = row else { return Ok(None) };
    let processed: bool = row.try_get("processed").map_err(|e| StoreError::new("fetch_history", e))?;
    let base = event_from_row(&row).map_err(|e| StoreError::new("fetch_history", e))?;
    Ok(Some(HistoryEvent {
        id: base.id,
        occurred_at: base.occurred_at,
        attempts: base.attempts,
        visible_at: base.visible_at,
        claimed_at: base.claimed_at,
        kind: base.kind,
        payload: base.payload,
        processed,
    }))
}

/// Count of rows currently in `active`. Test/observability helper, not on
/// the hot path.
pub async fn count_active(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query("select count(*)::bigint as n from active")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::new("count_active", e))?;
    row.try_get("n").map_err(|e| StoreError::new("count_active", e))
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> std::result::Result<Event, sqlx::Error> {
    Ok(Event {
        id: EventId(row.try_get("id")?),
        occurred_at: row.try_get("occurred_at")?,
        attempts: row.try_get("attempts")?,
        visible_at: row.try_get("visible_at")?,
        claimed_at: row.try_get("claimed_at")?,
        kind: row.try_get("kind")?,
        payload: row.try_get("payload")?,
    })
}

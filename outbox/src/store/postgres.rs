//! Postgres-backed change log store.
//!
//! The change log lives in the `outbox_events` table, created by the bundled
//! sqlx migrations. Filter fragments use `:name` placeholders which are
//! expanded to positional `$n` binds before execution, so filters stay
//! portable between this store and the in-memory one.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::{ErrorKind, OutboxResult};
use crate::store::base::OutboxStore;
use crate::store::filter::{EventFilter, FilterValue};
use crate::types::{EntityRef, EventId, EventType, NewEvent, OutboxEvent};
use crate::{bail, outbox_error};

/// Table alias used for filter fragments in finder queries.
const EVENTS_ALIAS: &str = "e";

/// Postgres implementation of [`OutboxStore`].
///
/// Works against any pool pointing at a database where the bundled migrations
/// have been applied. Connection management and configuration loading are the
/// caller's concern; the store only borrows a ready [`PgPool`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store on top of an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled change log migrations.
    pub async fn apply_migrations(&self) -> OutboxResult<()> {
        info!("applying outbox migrations");

        let migrator = sqlx::migrate!("./migrations");
        migrator
            .run(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::migrate::MigrateError::Execute(err) => err.into(),
                err => outbox_error!(
                    ErrorKind::StoreQueryFailed,
                    "Outbox migrations failed",
                    detail = err.to_string()
                ),
            })?;

        info!("outbox migrations successfully applied");

        Ok(())
    }
}

impl OutboxStore for PostgresStore {
    async fn append(&self, event: NewEvent) -> OutboxResult<EventId> {
        let entity_hash = event.entity_hash();
        let payload = event.payload()?;

        let row = sqlx::query(
            "insert into outbox_events (entity_name, entity_id, entity_hash, event_type, payload, moment) \
             values ($1, $2, $3, $4, $5, $6) returning id",
        )
        .bind(&event.entity.entity_name)
        .bind(&event.entity.entity_id)
        .bind(entity_hash)
        .bind(event.event_type.as_i16())
        .bind(&payload)
        .bind(event.moment)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("id")?)
    }

    async fn find_batch(
        &self,
        max_results: usize,
        filter: &dyn EventFilter,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let fragment = filter.fragment(EVENTS_ALIAS);
        let parameters = filter.parameters();

        let condition = expand_placeholders(&fragment, &parameters)?;
        let limit_position = parameters.len() + 1;

        let sql = format!(
            "select {a}.id, {a}.entity_name, {a}.entity_id, {a}.entity_hash, \
             {a}.event_type, {a}.payload, {a}.moment, {a}.retry_count \
             from outbox_events {a} where {condition} \
             order by {a}.moment, {a}.id limit ${limit_position}",
            a = EVENTS_ALIAS,
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in parameters {
            query = match value {
                FilterValue::BigInt(value) => query.bind(value),
                FilterValue::BigIntArray(values) => query.bind(values),
                FilterValue::Text(value) => query.bind(value),
                FilterValue::Timestamp(value) => query.bind(value),
            };
        }
        query = query.bind(max_results as i64);

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn delete_events(&self, ids: &[EventId]) -> OutboxResult<u64> {
        let result = sqlx::query("delete from outbox_events where id = any($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn increment_retry_count(&self, ids: &[EventId]) -> OutboxResult<()> {
        sqlx::query("update outbox_events set retry_count = retry_count + 1 where id = any($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Maps a finder result row to an [`OutboxEvent`].
fn event_from_row(row: PgRow) -> OutboxResult<OutboxEvent> {
    let event_type_code = row.try_get::<i16, _>("event_type")?;
    let Some(event_type) = EventType::from_i16(event_type_code) else {
        bail!(
            ErrorKind::InvalidData,
            "Unknown event type in change log",
            format!("event type code {event_type_code}")
        );
    };

    Ok(OutboxEvent {
        id: row.try_get("id")?,
        entity: EntityRef {
            entity_name: row.try_get("entity_name")?,
            entity_id: row.try_get("entity_id")?,
        },
        entity_hash: row.try_get("entity_hash")?,
        event_type,
        payload: row.try_get("payload")?,
        moment: row.try_get("moment")?,
        retry_count: row.try_get("retry_count")?,
    })
}

/// Rewrites `:name` placeholders in a filter fragment to positional `$n` binds.
///
/// Placeholder positions follow the order of the parameter list, so the caller
/// must bind values in that same order. Placeholders with no matching parameter
/// are rejected rather than passed through to Postgres.
fn expand_placeholders(
    fragment: &str,
    parameters: &[(&'static str, FilterValue)],
) -> OutboxResult<String> {
    fn is_ident_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    let mut expanded = String::with_capacity(fragment.len());
    let mut chars = fragment.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != ':' {
            expanded.push(c);
            continue;
        }

        // A double colon is a Postgres cast, not a placeholder.
        if let Some((_, ':')) = chars.peek() {
            chars.next();
            expanded.push_str("::");
            continue;
        }

        let mut name = String::new();
        while let Some((_, next)) = chars.peek() {
            if is_ident_char(*next) {
                name.push(*next);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            // A bare colon, e.g. part of a cast. Left untouched.
            expanded.push(':');
            continue;
        }

        let Some(position) = parameters.iter().position(|(param, _)| *param == name) else {
            bail!(
                ErrorKind::InvalidData,
                "Filter placeholder has no bound parameter",
                format!("placeholder :{name}")
            );
        };

        expanded.push('$');
        expanded.push_str(&(position + 1).to_string());
    }

    Ok(expanded)
}

//! Queries over `events` and `room_info`.

use time::OffsetDateTime;
use uuid::Uuid;

use herald_domain::SelectionWindow;

use crate::{
	Result, UpdateOutcome,
	db::Db,
	models::{EventRecord, EventRow, RoomKeys},
};

const EVENT_COLUMNS: &str = "\
id, profile_id, name, description, image_url, start_time, end_time, room_name, identifier, \
naddr_id, nostr_pubkey, status, status_detail, nostr_status";

/// Which timestamp a live-event selection is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEdge {
	Start,
	End,
}
impl WindowEdge {
	fn column(self) -> &'static str {
		match self {
			Self::Start => "start_time",
			Self::End => "end_time",
		}
	}
}

/// Events whose start or end falls inside `window` and whose status is none of
/// `excluded_statuses`. A `NULL` status counts as a candidate.
pub async fn select_in_window(
	db: &Db,
	edge: WindowEdge,
	window: &SelectionWindow,
	excluded_statuses: &[&str],
) -> Result<Vec<EventRecord>> {
	let column = edge.column();
	let excluded = owned(excluded_statuses);
	let sql = format!(
		"\
SELECT {EVENT_COLUMNS}
FROM events
WHERE {column} >= $1
	AND {column} <= $2
	AND (status IS NULL OR status <> ALL($3))
ORDER BY {column} ASC, id ASC"
	);
	let rows: Vec<EventRow> = sqlx::query_as(&sql)
		.bind(window.start)
		.bind(window.end)
		.bind(excluded)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows.into_iter().map(EventRecord::from).collect())
}

/// Published events edited since their announcement, newest edit first.
pub async fn select_pending_updates(
	db: &Db,
	candidate_statuses: &[&str],
	limit: i64,
) -> Result<Vec<EventRecord>> {
	let statuses = owned(candidate_statuses);
	let sql = format!(
		"\
SELECT {EVENT_COLUMNS}
FROM events
WHERE nostr_status = ANY($1)
	AND identifier IS NOT NULL
	AND naddr_id IS NOT NULL
ORDER BY updated_at DESC
LIMIT $2"
	);
	let rows: Vec<EventRow> =
		sqlx::query_as(&sql).bind(statuses).bind(limit).fetch_all(&db.pool).await?;

	Ok(rows.into_iter().map(EventRecord::from).collect())
}

pub async fn fetch_room_keys(db: &Db, room_name: &str) -> Result<Option<RoomKeys>> {
	let keys = sqlx::query_as::<_, RoomKeys>(
		"\
SELECT room_name, room_npub, room_nsec, room_relay_url
FROM room_info
WHERE room_name = $1",
	)
	.bind(room_name)
	.fetch_optional(&db.pool)
	.await?;

	Ok(keys)
}

/// Sets the live status, its detail and (when known) the announced event id. Rows already
/// carrying the same status and detail, or one of `protected_statuses`, are left alone and
/// reported as [`UpdateOutcome::Unchanged`].
pub async fn update_status(
	db: &Db,
	id: Uuid,
	status: &str,
	detail: Option<&str>,
	event_id: Option<&str>,
	protected_statuses: &[&str],
	now: OffsetDateTime,
) -> Result<UpdateOutcome> {
	let result = sqlx::query(
		"\
UPDATE events
SET status = $2,
	status_detail = $3,
	nostr_event_id = COALESCE($4, nostr_event_id),
	updated_at = $5
WHERE id = $1
	AND (status, status_detail) IS DISTINCT FROM ($2::text, $3::text)
	AND (status IS NULL OR status <> ALL($6))",
	)
	.bind(id)
	.bind(status)
	.bind(detail)
	.bind(event_id)
	.bind(now)
	.bind(owned(protected_statuses))
	.execute(&db.pool)
	.await?;

	outcome(db, id, result.rows_affected()).await
}

/// Records the outcome of an update announcement. `processed_at` is only written on success.
pub async fn update_nostr_status(
	db: &Db,
	id: Uuid,
	status: &str,
	error: Option<&str>,
	processed_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<UpdateOutcome> {
	let result = sqlx::query(
		"\
UPDATE events
SET nostr_status = $2,
	nostr_error = $3,
	nostr_processed_at = COALESCE($4, nostr_processed_at),
	updated_at = $5
WHERE id = $1
	AND (nostr_status, nostr_error) IS DISTINCT FROM ($2::text, $3::text)",
	)
	.bind(id)
	.bind(status)
	.bind(error)
	.bind(processed_at)
	.bind(now)
	.execute(&db.pool)
	.await?;

	outcome(db, id, result.rows_affected()).await
}

fn owned(statuses: &[&str]) -> Vec<String> {
	statuses.iter().map(|status| status.to_string()).collect()
}

async fn outcome(db: &Db, id: Uuid, rows_affected: u64) -> Result<UpdateOutcome> {
	if rows_affected > 0 {
		return Ok(UpdateOutcome::Updated);
	}

	let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
		.bind(id)
		.fetch_one(&db.pool)
		.await?;

	Ok(if exists { UpdateOutcome::Unchanged } else { UpdateOutcome::NotFound })
}

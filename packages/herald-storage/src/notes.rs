use time::OffsetDateTime;
use uuid::Uuid;

use herald_domain::SelectionWindow;

use crate::{
	Result, UpdateOutcome,
	db::Db,
	models::{NoteRecord, NoteRow},
};

/// Notes due by `window.end`, oldest first. A note in `pending_status` is due however late it
/// is; one in `failed_status` is retried only while scheduled inside `window`.
pub async fn select_due(
	db: &Db,
	window: &SelectionWindow,
	pending_status: &str,
	failed_status: &str,
	limit: Option<i64>,
) -> Result<Vec<NoteRecord>> {
	let rows: Vec<NoteRow> = sqlx::query_as(
		"\
SELECT id, profile_id, content, scheduled_for, status, relay_urls, event_id, error_message,
	signed_event
FROM scheduled_notes
WHERE scheduled_for <= $3
	AND (status = $1 OR (status = $2 AND scheduled_for >= $4))
ORDER BY scheduled_for ASC, id ASC
LIMIT $5",
	)
	.bind(pending_status)
	.bind(failed_status)
	.bind(window.end)
	.bind(window.start)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(NoteRecord::from).collect())
}

/// `published_at` is stamped only when `status` is `published`; `event_id` is kept when `None`.
pub async fn update_status(
	db: &Db,
	id: Uuid,
	status: &str,
	detail: Option<&str>,
	event_id: Option<&str>,
	now: OffsetDateTime,
) -> Result<UpdateOutcome> {
	let result = sqlx::query(
		"\
UPDATE scheduled_notes
SET status = $2,
	error_message = $3,
	event_id = COALESCE($4, event_id),
	published_at = CASE WHEN $2::text = 'published' THEN $5 ELSE published_at END,
	updated_at = $5
WHERE id = $1
	AND (status, error_message) IS DISTINCT FROM ($2::text, $3::text)",
	)
	.bind(id)
	.bind(status)
	.bind(detail)
	.bind(event_id)
	.bind(now)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() > 0 {
		return Ok(UpdateOutcome::Updated);
	}

	let exists: bool =
		sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM scheduled_notes WHERE id = $1)")
			.bind(id)
			.fetch_one(&db.pool)
			.await?;

	Ok(if exists { UpdateOutcome::Unchanged } else { UpdateOutcome::NotFound })
}

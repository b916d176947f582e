use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Result, schema};

const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
const SCHEMA_LOCK_ID: i64 = 3_031_130_312;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	/// Builds the pool and pings the server so an unreachable store fails at startup.
	pub async fn connect(cfg: &herald_config::Postgres) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.min_connections(1)
			.acquire_timeout(Duration::from_millis(cfg.connect_timeout_ms))
			.idle_timeout(IDLE_TIMEOUT)
			.max_lifetime(MAX_LIFETIME)
			.connect(&cfg.dsn)
			.await?;
		let db = Self { pool };

		db.ping().await?;

		Ok(db)
	}

	pub async fn ping(&self) -> Result<()> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;

		Ok(())
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

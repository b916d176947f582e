//! Disposable Postgres databases and row fixtures for the integration tests.
//!
//! Tests that need Postgres read [`ENV_PG_DSN`]; when it is unset they return early so the
//! default test run stays hermetic.

pub mod seed;

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

pub const ENV_PG_DSN: &str = "HERALD_PG_DSN";

/// Databases tried, in order, for `CREATE DATABASE` and `DROP DATABASE`.
const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

pub fn env_dsn() -> Option<String> {
	env::var(ENV_PG_DSN).ok().filter(|dsn| !dsn.trim().is_empty())
}

/// A `herald_test_<uuid>` database on the server named by the base DSN.
///
/// Call [`TestDatabase::cleanup`] at the end of a test. If the test panics first, `Drop` removes
/// the database from a helper thread.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Setup(format!("{ENV_PG_DSN} is not a valid DSN: {err}.")))?;
		let (maintenance, mut conn) = maintenance_connection(&base).await?;
		let name = format!("herald_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Setup(format!("Failed to create database {name}: {err}.")))?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.name, &self.maintenance).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		// The owning test may still be inside a runtime, so block on a fresh one elsewhere.
		let handle = thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
			let result = match runtime {
				Ok(runtime) => runtime.block_on(drop_database(&name, &maintenance)),
				Err(err) => Err(Error::Setup(format!("Failed to start cleanup runtime: {err}."))),
			};

			if let Err(err) = result {
				eprintln!("Leaked test database {name}: {err}");
			}
		});

		let _ = handle.join();
	}
}

async fn maintenance_connection(
	base: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut errors = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => errors.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Setup(format!("No maintenance database reachable ({}).", errors.join("; "))))
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	// Pools from the test may still hold connections.
	sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await?;
	sqlx::query(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).execute(&mut conn).await?;

	Ok(())
}

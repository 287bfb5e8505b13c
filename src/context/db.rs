// {{{ Imports
use anyhow::Context;
use include_dir::{include_dir, Dir};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite_migration::Migrations;
use std::sync::LazyLock;

use crate::context::paths::EncorePaths;
// }}}

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");
static MIGRATIONS: LazyLock<Migrations> = LazyLock::new(|| {
	Migrations::from_directory(&MIGRATIONS_DIR).expect("Could not load migrations")
});

/// Bring a connection's schema up to date. Exposed separately so tests can
/// run against in-memory databases.
pub fn apply_migrations(conn: &mut rusqlite::Connection) -> anyhow::Result<()> {
	MIGRATIONS
		.to_latest(conn)
		.with_context(|| "Could not run migrations")?;
	Ok(())
}

pub fn connect_db(paths: &EncorePaths) -> anyhow::Result<SqlitePool> {
	let db_path = paths.db_path();
	let mut conn = rusqlite::Connection::open(&db_path)
		.with_context(|| "Could not connect to sqlite database")?;
	conn.pragma_update(None, "journal_mode", "WAL")?;
	conn.pragma_update(None, "foreign_keys", "ON")?;

	apply_migrations(&mut conn)?;
	println!("✅ Ensured db schema is up to date");

	let manager = SqliteConnectionManager::file(&db_path)
		.with_init(|conn| conn.pragma_update(None, "foreign_keys", "ON"));
	Pool::new(manager).with_context(|| "Could not open sqlite database.")
}

// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn migrations_apply_cleanly_and_idempotently() {
		let mut conn = rusqlite::Connection::open_in_memory().unwrap();
		apply_migrations(&mut conn).unwrap();
		apply_migrations(&mut conn).unwrap();

		let version: i64 = conn
			.query_row("SELECT MAX(version) FROM schema_version", (), |row| {
				row.get(0)
			})
			.unwrap();
		assert_eq!(version, 2);

		// The unique constraint the classifier leans on must exist
		conn.execute(
			"INSERT INTO users(external_id, display_name, auth_token) VALUES ('1', 'a', 't')",
			(),
		)
		.unwrap();
		conn.execute(
			"INSERT INTO scores(user_id, chart_hash, instrument_id, difficulty_id, score,
			 completion_percent, stars) VALUES (1, 'h', 0, 3, 100, 95.0, 5)",
			(),
		)
		.unwrap();
		let err = conn.execute(
			"INSERT INTO scores(user_id, chart_hash, instrument_id, difficulty_id, score,
			 completion_percent, stars) VALUES (1, 'h', 0, 3, 200, 95.0, 5)",
			(),
		);
		assert!(err.is_err());
	}
}
// }}}

//! Users and the pairing handshake that issues their auth tokens.
//!
//! Pairing is a token exchange: the client asks for a short code, a human
//! approves it out-of-band (the chat bot side, outside this crate), and the
//! client polls until a token appears. We only own the data path.

// {{{ Imports
use chrono::{NaiveDateTime, TimeDelta, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::context::Error;
// }}}

// {{{ User
#[derive(Debug, Clone)]
pub struct User {
	pub id: i64,
	pub external_id: String,
	pub display_name: String,
	pub auth_token: String,
	pub created_at: NaiveDateTime,
	pub last_seen: NaiveDateTime,
}

impl User {
	fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
		Ok(Self {
			id: row.get("id")?,
			external_id: row.get("external_id")?,
			display_name: row.get("display_name")?,
			auth_token: row.get("auth_token")?,
			created_at: row.get("created_at")?,
			last_seen: row.get("last_seen")?,
		})
	}

	pub fn by_auth_token(conn: &Connection, auth_token: &str) -> Result<Option<Self>, Error> {
		let user = conn
			.prepare_cached("SELECT * FROM users WHERE auth_token = ?")?
			.query_row([auth_token], Self::from_row)
			.optional()?;
		Ok(user)
	}

	pub fn by_external_id(conn: &Connection, external_id: &str) -> Result<Option<Self>, Error> {
		let user = conn
			.prepare_cached("SELECT * FROM users WHERE external_id = ?")?
			.query_row([external_id], Self::from_row)
			.optional()?;
		Ok(user)
	}

	pub fn by_id(conn: &Connection, id: i64) -> Result<Option<Self>, Error> {
		let user = conn
			.prepare_cached("SELECT * FROM users WHERE id = ?")?
			.query_row([id], Self::from_row)
			.optional()?;
		Ok(user)
	}

	pub fn create(
		conn: &Connection,
		external_id: &str,
		display_name: &str,
	) -> Result<Self, Error> {
		let auth_token = uuid::Uuid::new_v4().simple().to_string();

		let user = conn
			.prepare_cached(
				"
          INSERT INTO users(external_id, display_name, auth_token)
          VALUES (?, ?, ?)
          RETURNING *
        ",
			)?
			.query_row(
				[external_id, display_name, auth_token.as_str()],
				Self::from_row,
			)?;

		tracing::info!(user = user.display_name, id = user.id, "Created user");
		Ok(user)
	}

	pub fn touch_last_seen(conn: &Connection, id: i64) -> Result<(), Error> {
		conn.prepare_cached("UPDATE users SET last_seen = CURRENT_TIMESTAMP WHERE id = ?")?
			.execute([id])?;
		Ok(())
	}
}
// }}}
// {{{ Pairing
pub const PAIRING_EXPIRY_SECONDS: i64 = 300;

/// No 0/O/1/I, so codes survive being read over voice chat.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

pub fn create_pairing_code(conn: &Connection, client_id: &str) -> Result<String, Error> {
	let mut rng = rand::thread_rng();
	let code: String = (0..CODE_LENGTH)
		.map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
		.collect();

	let expires_at = Utc::now().naive_utc() + TimeDelta::seconds(PAIRING_EXPIRY_SECONDS);
	conn.prepare_cached(
		"INSERT INTO pairing_codes(code, client_id, expires_at) VALUES (?, ?, ?)",
	)?
	.execute(rusqlite::params![code, client_id, expires_at])?;

	Ok(code)
}

/// Approve a pairing code, creating the user if needed. Returns the auth
/// token, or `None` when the code is unknown, expired or already used.
pub fn complete_pairing(
	conn: &Connection,
	code: &str,
	external_id: &str,
	display_name: &str,
) -> Result<Option<String>, Error> {
	let ticket = conn
		.prepare_cached("SELECT expires_at, completed FROM pairing_codes WHERE code = ?")?
		.query_row([code], |row| {
			Ok((
				row.get::<_, NaiveDateTime>("expires_at")?,
				row.get::<_, bool>("completed")?,
			))
		})
		.optional()?;

	let Some((expires_at, completed)) = ticket else {
		return Ok(None);
	};
	if completed || Utc::now().naive_utc() > expires_at {
		return Ok(None);
	}

	let user = match User::by_external_id(conn, external_id)? {
		Some(user) => user,
		None => User::create(conn, external_id, display_name)?,
	};

	conn.prepare_cached(
		"
      UPDATE pairing_codes
      SET external_id = ?, auth_token = ?, completed = 1
      WHERE code = ?
    ",
	)?
	.execute([external_id, user.auth_token.as_str(), code])?;

	Ok(Some(user.auth_token))
}

/// The token for a client's most recent completed pairing, if any.
pub fn pairing_status(conn: &Connection, client_id: &str) -> Result<Option<String>, Error> {
	let token = conn
		.prepare_cached(
			"
        SELECT auth_token FROM pairing_codes
        WHERE client_id = ? AND completed = 1
        ORDER BY created_at DESC
        LIMIT 1
      ",
		)?
		.query_row([client_id], |row| row.get("auth_token"))
		.optional()?;
	Ok(token)
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::testing::test_connection;

	#[test]
	fn pairing_flow_issues_a_token() {
		let conn = test_connection();

		let code = create_pairing_code(&conn, "client-1").unwrap();
		assert_eq!(code.len(), CODE_LENGTH);
		assert!(pairing_status(&conn, "client-1").unwrap().is_none());

		let token = complete_pairing(&conn, &code, "ext-1", "Player One")
			.unwrap()
			.unwrap();
		assert_eq!(pairing_status(&conn, "client-1").unwrap(), Some(token.clone()));

		let user = User::by_auth_token(&conn, &token).unwrap().unwrap();
		assert_eq!(user.external_id, "ext-1");

		// A used code can't be completed twice
		assert!(complete_pairing(&conn, &code, "ext-2", "Player Two")
			.unwrap()
			.is_none());
	}

	#[test]
	fn completing_for_existing_user_reuses_their_token() {
		let conn = test_connection();
		let existing = User::create(&conn, "ext-1", "Player One").unwrap();

		let code = create_pairing_code(&conn, "client-2").unwrap();
		let token = complete_pairing(&conn, &code, "ext-1", "Player One")
			.unwrap()
			.unwrap();
		assert_eq!(token, existing.auth_token);
	}

	#[test]
	fn unknown_codes_are_rejected() {
		let conn = test_connection();
		assert!(complete_pairing(&conn, "NOPE42", "ext", "name")
			.unwrap()
			.is_none());
	}
}
// }}}

//! The catalog: a durable SQLite-backed store of files, tapes and restore
//! jobs, and the single source of truth across crashes.
//!
//! [`Catalog`] never exposes raw SQL to callers; every operation named in
//! the component design is a typed method here. A single [`Mutex`] around
//! the connection gives the per-file atomicity the rest of the system
//! relies on — there is no multi-row transaction anywhere in this module,
//! by design: every mutation is meant to be a safe prefix on its own.

pub mod model;
mod schema;

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::Mutex,
	time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::CatalogError;
use model::{File, FileId, RestoreJob, RestoreJobFileMap, RestoreJobId, RestoreJobStats, Tape, TapeId};

/// Number of busy-retry attempts before giving up, per spec: up to 10
/// attempts, ~5 seconds apart.
const BUSY_RETRIES: u32 = 10;
const BUSY_RETRY_DELAY: Duration = Duration::from_secs(5);

pub const EXPECTED_SCHEMA_VERSION: i64 = schema::CURRENT_SCHEMA_VERSION;

pub struct Catalog {
	conn: Mutex<Connection>,
}

impl Catalog {
	/// Open (creating if absent) the catalog at `path` and ensure the schema
	/// exists. Does not check the schema version — callers that need the
	/// "refuse to run on the wrong version" contract call
	/// [`Catalog::check_schema_version`] explicitly, since `db migrate` and
	/// `config create_key` are allowed to run against an unversioned or
	/// mismatched catalog.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
		let path = path.as_ref();
		let conn = Connection::open(path).map_err(|source| CatalogError::Open {
			path: path.to_owned(),
			source,
		})?;
		conn.pragma_update(None, "journal_mode", "WAL")
			.map_err(CatalogError::Query)?;
		conn.pragma_update(None, "foreign_keys", "ON")
			.map_err(CatalogError::Query)?;
		conn.execute_batch(schema::CREATE_TABLES)
			.map_err(CatalogError::Migration)?;
		Ok(Self {
			conn: Mutex::new(conn),
		})
	}

	/// An in-memory catalog, used by tests.
	pub fn open_in_memory() -> Result<Self, CatalogError> {
		let conn = Connection::open_in_memory().map_err(|source| CatalogError::Open {
			path: PathBuf::from(":memory:"),
			source,
		})?;
		conn.execute_batch(schema::CREATE_TABLES)
			.map_err(CatalogError::Migration)?;
		Ok(Self {
			conn: Mutex::new(conn),
		})
	}

	/// Run `body` against the locked connection, retrying on SQLITE_BUSY /
	/// SQLITE_LOCKED up to [`BUSY_RETRIES`] times with a fixed backoff.
	///
	/// This blocks the calling thread for the duration of the retries; call
	/// sites inside async worker tasks should run it via
	/// `tokio::task::spawn_blocking`.
	fn with_retry<T>(
		&self,
		mut body: impl FnMut(&Connection) -> rusqlite::Result<T>,
	) -> Result<T, CatalogError> {
		let mut attempt = 0;
		loop {
			let conn = self.conn.lock().expect("catalog mutex poisoned");
			match body(&conn) {
				Ok(value) => return Ok(value),
				Err(rusqlite::Error::SqliteFailure(err, _))
					if matches!(
						err.code,
						rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
					) && attempt < BUSY_RETRIES =>
				{
					drop(conn);
					attempt += 1;
					warn!(attempt, "catalog busy, retrying");
					std::thread::sleep(BUSY_RETRY_DELAY);
				}
				Err(rusqlite::Error::SqliteFailure(_, _)) if attempt >= BUSY_RETRIES => {
					return Err(CatalogError::Busy { retries: attempt });
				}
				Err(other) => return Err(CatalogError::Query(other)),
			}
		}
	}

	// ---- schema / config -------------------------------------------------

	pub fn get_config(&self, key: &str) -> Result<Option<String>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(
				"SELECT value FROM config WHERE key = ?1",
				[key],
				|row| row.get(0),
			)
			.optional()
		})
	}

	pub fn set_config(&self, key: &str, value: &str) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"INSERT INTO config (key, value) VALUES (?1, ?2)
				 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
				(key, value),
			)
			.map(|_| ())
		})
	}

	/// The schema version the catalog currently claims: absent ⇒ `None`
	/// ("needs migrate"), present ⇒ `Some(n)` for the
	/// caller to compare against [`EXPECTED_SCHEMA_VERSION`] ("needs
	/// upgrade" if it differs).
	pub fn schema_version(&self) -> Result<Option<i64>, CatalogError> {
		self.get_config("version")?
			.map(|v| v.parse::<i64>().map_err(|_| CatalogError::Query(rusqlite::Error::InvalidQuery)))
			.transpose()
	}

	pub fn set_schema_version(&self, version: i64) -> Result<(), CatalogError> {
		self.set_config("version", &version.to_string())
	}

	// ---- file: write -------------------------------------------------

	pub fn insert_file(&self, filename: &str, path: &str) -> Result<FileId, CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"INSERT INTO file (filename, path) VALUES (?1, ?2)",
				(filename, path),
			)?;
			Ok(conn.last_insert_rowid())
		})
	}

	pub fn mark_downloaded(
		&self,
		id: FileId,
		filesize: i64,
		mtime: DateTime<Utc>,
		hash_plaintext: &str,
	) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET filesize = ?2, mtime = ?3, hash_plaintext = ?4,
				 downloaded = 1, downloaded_date = ?5 WHERE id = ?1",
				(id, filesize, mtime.to_rfc3339(), hash_plaintext, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	pub fn fold_into_duplicate(&self, id: FileId, primary_id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET duplicate_of = ?2, downloaded = 1, downloaded_date = ?3 WHERE id = ?1",
				(id, primary_id, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	/// Reserve `opaque_name` as this file's encrypted name. Returns `Ok(false)`
	/// on a uniqueness collision (caller should regenerate and retry), not an
	/// error — collisions are an expected, recoverable event.
	pub fn claim_encrypted_name(&self, id: FileId, opaque_name: &str) -> Result<bool, CatalogError> {
		self.with_retry(|conn| {
			match conn.execute(
				"UPDATE file SET filename_encrypted = ?2 WHERE id = ?1",
				(id, opaque_name),
			) {
				Ok(_) => Ok(true),
				Err(rusqlite::Error::SqliteFailure(err, _))
					if err.code == rusqlite::ErrorCode::ConstraintViolation =>
				{
					Ok(false)
				}
				Err(other) => Err(other),
			}
		})
	}

	pub fn clear_encrypted_name_claim(&self, id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET filename_encrypted = NULL WHERE id = ?1",
				[id],
			)
			.map(|_| ())
		})
	}

	pub fn mark_encrypted(
		&self,
		id: FileId,
		filesize_encrypted: i64,
		hash_encrypted: &str,
	) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET filesize_encrypted = ?2, hash_encrypted = ?3,
				 encrypted = 1, encrypted_date = ?4 WHERE id = ?1",
				(id, filesize_encrypted, hash_encrypted, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	pub fn mark_written(
		&self,
		id: FileId,
		tape_id: TapeId,
		tape_position: Option<i64>,
	) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET tape_id = ?2, tape_position = ?3,
				 written = 1, written_date = ?4 WHERE id = ?1",
				(id, tape_id, tape_position, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	/// Undo every row's write attribution for a tape. Used on the no-space
	/// anomaly path (§4.5): the tape itself is then force-reformatted.
	pub fn revert_written_by_tape(&self, tape_id: TapeId) -> Result<usize, CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET written = 0, tape_id = NULL, written_date = NULL,
				 tape_position = NULL WHERE tape_id = ?1",
				[tape_id],
			)
		})
	}

	pub fn mark_file_deleted(&self, id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute("UPDATE file SET deleted = 1 WHERE id = ?1", [id])
				.map(|_| ())
		})
	}

	pub fn delete_file(&self, id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| conn.execute("DELETE FROM file WHERE id = ?1", [id]).map(|_| ()))
	}

	pub fn set_verified(&self, id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE file SET verified_count = verified_count + 1, verified_last = ?2 WHERE id = ?1",
				(id, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	// ---- file: read --------------------------------------------------

	pub fn file_by_id(&self, id: FileId) -> Result<Option<File>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(&format!("{SELECT_FILE} WHERE id = ?1"), [id], row_to_file)
				.optional()
		})
	}

	pub fn file_by_relpath(&self, path: &str) -> Result<Option<File>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(&format!("{SELECT_FILE} WHERE path = ?1"), [path], row_to_file)
				.optional()
		})
	}

	pub fn file_by_plaintext_hash(&self, hash: &str) -> Result<Option<File>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(
				&format!("{SELECT_FILE} WHERE hash_plaintext = ?1 AND duplicate_of IS NULL"),
				[hash],
				row_to_file,
			)
			.optional()
		})
	}

	pub fn files_ready_to_encrypt(&self) -> Result<Vec<File>, CatalogError> {
		self.query_files(&format!(
			"{SELECT_FILE} WHERE downloaded = 1 AND encrypted = 0 AND deleted = 0"
		))
	}

	pub fn files_ready_to_write(&self) -> Result<Vec<File>, CatalogError> {
		self.query_files(&format!(
			"{SELECT_FILE} WHERE downloaded = 1 AND encrypted = 1 AND written = 0 AND deleted = 0"
		))
	}

	pub fn files_on_tape(&self, label: &str) -> Result<Vec<File>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare(&format!(
				"{SELECT_FILE} WHERE tape_id = (SELECT id FROM tape WHERE label = ?1)"
			))?;
			let rows = stmt.query_map([label], row_to_file)?;
			rows.collect()
		})
	}

	/// `patterns` use shell-style `*`, translated to SQL `%` before the
	/// query is issued. An empty pattern list matches every
	/// file, subject to the `tape`/`written` filters.
	pub fn files_matching(
		&self,
		patterns: &[String],
		tape: Option<&str>,
		written: Option<bool>,
	) -> Result<Vec<File>, CatalogError> {
		self.with_retry(|conn| {
			let mut sql = format!("{SELECT_FILE} WHERE 1=1");
			let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

			if !patterns.is_empty() {
				let clauses: Vec<String> = patterns
					.iter()
					.map(|_| "(path LIKE ? OR filename LIKE ?)".to_owned())
					.collect();
				sql.push_str(" AND (");
				sql.push_str(&clauses.join(" OR "));
				sql.push(')');
				for pattern in patterns {
					let sql_pattern = pattern.replace('*', "%");
					params.push(Box::new(sql_pattern.clone()));
					params.push(Box::new(sql_pattern));
				}
			}
			if let Some(label) = tape {
				sql.push_str(" AND tape_id = (SELECT id FROM tape WHERE label = ?)");
				params.push(Box::new(label.to_owned()));
			}
			if let Some(written) = written {
				sql.push_str(" AND written = ?");
				params.push(Box::new(written));
			}

			let mut stmt = conn.prepare(&sql)?;
			let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
			let rows = stmt.query_map(param_refs.as_slice(), row_to_file)?;
			rows.collect()
		})
	}

	pub fn duplicates(&self) -> Result<Vec<File>, CatalogError> {
		self.query_files(&format!("{SELECT_FILE} WHERE duplicate_of IS NOT NULL"))
	}

	pub fn not_deleted_files(&self) -> Result<Vec<File>, CatalogError> {
		self.query_files(&format!("{SELECT_FILE} WHERE deleted = 0"))
	}

	fn query_files(&self, sql: &str) -> Result<Vec<File>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare(sql)?;
			let rows = stmt.query_map([], row_to_file)?;
			rows.collect()
		})
	}

	// ---- tape ----------------------------------------------------------

	pub fn tape_by_label(&self, label: &str) -> Result<Option<Tape>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(&format!("{SELECT_TAPE} WHERE label = ?1"), [label], row_to_tape)
				.optional()
		})
	}

	/// Fetch the row for `label`, inserting a fresh one if this is the
	/// first time the Write stage has selected this tape.
	pub fn get_or_create_tape(&self, label: &str) -> Result<Tape, CatalogError> {
		if let Some(tape) = self.tape_by_label(label)? {
			return Ok(tape);
		}
		self.with_retry(|conn| {
			conn.execute("INSERT INTO tape (label) VALUES (?1)", [label])?;
			Ok(())
		})?;
		self.tape_by_label(label)?
			.ok_or_else(|| CatalogError::TapeNotFound(0))
	}

	pub fn all_tapes(&self) -> Result<Vec<Tape>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare(SELECT_TAPE)?;
			let rows = stmt.query_map([], row_to_tape)?;
			rows.collect()
		})
	}

	pub fn mark_tape_full(
		&self,
		label: &str,
		ts: DateTime<Utc>,
		files_count: i64,
	) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE tape SET full = 1, full_date = ?2, files_count = ?3 WHERE label = ?1",
				(label, ts.to_rfc3339(), files_count),
			)
			.map(|_| ())
		})
	}

	pub fn update_tape_end_of_data(&self, tape_id: TapeId, end_of_data: i64) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE tape SET end_of_data = ?2 WHERE id = ?1",
				(tape_id, end_of_data),
			)
			.map(|_| ())
		})
	}

	pub fn set_tape_verified(&self, label: &str) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE tape SET verified_count = verified_count + 1, verified_last = ?2 WHERE label = ?1",
				(label, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	// ---- restore jobs ----------------------------------------------------

	pub fn create_restore_job(&self) -> Result<RestoreJobId, CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"INSERT INTO restore_job (started) VALUES (?1)",
				[Utc::now().to_rfc3339()],
			)?;
			Ok(conn.last_insert_rowid())
		})
	}

	pub fn add_restore_job_files(
		&self,
		job_id: RestoreJobId,
		file_ids: &[FileId],
	) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			for file_id in file_ids {
				conn.execute(
					"INSERT INTO restore_job_file_map (file_id, restore_job_id) VALUES (?1, ?2)",
					(file_id, job_id),
				)?;
			}
			Ok(())
		})
	}

	pub fn mark_file_restored(&self, job_id: RestoreJobId, file_id: FileId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE restore_job_file_map SET restored = 1
				 WHERE restore_job_id = ?1 AND file_id = ?2",
				(job_id, file_id),
			)
			.map(|_| ())
		})
	}

	pub fn finish_restore_job(&self, job_id: RestoreJobId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"UPDATE restore_job SET finished = ?2 WHERE id = ?1",
				(job_id, Utc::now().to_rfc3339()),
			)
			.map(|_| ())
		})
	}

	pub fn delete_restore_job(&self, job_id: RestoreJobId) -> Result<(), CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"DELETE FROM restore_job_file_map WHERE restore_job_id = ?1",
				[job_id],
			)?;
			conn.execute("DELETE FROM restore_job WHERE id = ?1", [job_id])?;
			Ok(())
		})
	}

	pub fn restore_job_latest(&self) -> Result<Option<RestoreJob>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(
				"SELECT id, started, finished FROM restore_job ORDER BY id DESC LIMIT 1",
				[],
				row_to_restore_job,
			)
			.optional()
		})
	}

	pub fn restore_job_by_id(&self, id: RestoreJobId) -> Result<Option<RestoreJob>, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(
				"SELECT id, started, finished FROM restore_job WHERE id = ?1",
				[id],
				row_to_restore_job,
			)
			.optional()
		})
	}

	pub fn all_restore_jobs(&self) -> Result<Vec<RestoreJob>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare("SELECT id, started, finished FROM restore_job ORDER BY id")?;
			let rows = stmt.query_map([], row_to_restore_job)?;
			rows.collect()
		})
	}

	/// Files mapped into `job`, optionally filtered to a set of tape labels
	/// and/or a `restored` flag. Returns the file alongside its map row so
	/// callers can mark restoration without a second round-trip.
	pub fn restore_job_files(
		&self,
		job_id: RestoreJobId,
		tapes: Option<&[String]>,
		restored: Option<bool>,
	) -> Result<Vec<(RestoreJobFileMap, File)>, CatalogError> {
		self.with_retry(|conn| {
			let mut sql = format!(
				"SELECT m.id, m.restored, m.file_id, m.restore_job_id, {FILE_COLUMNS}
				 FROM restore_job_file_map m JOIN file f ON f.id = m.file_id
				 WHERE m.restore_job_id = ?1"
			);
			let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(job_id)];

			if let Some(tapes) = tapes {
				if !tapes.is_empty() {
					let placeholders = tapes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
					sql.push_str(&format!(
						" AND f.tape_id IN (SELECT id FROM tape WHERE label IN ({placeholders}))"
					));
					for label in tapes {
						params.push(Box::new(label.clone()));
					}
				}
			}
			if let Some(restored) = restored {
				sql.push_str(" AND m.restored = ?");
				params.push(Box::new(restored));
			}

			let mut stmt = conn.prepare(&sql)?;
			let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
			let rows = stmt.query_map(param_refs.as_slice(), |row| {
				let map = RestoreJobFileMap {
					id: row.get(0)?,
					restored: row.get(1)?,
					file_id: row.get(2)?,
					restore_job_id: row.get(3)?,
				};
				let file = row_to_file_offset(row, 4)?;
				Ok((map, file))
			})?;
			rows.collect()
		})
	}

	/// `(count, total-size, distinct-tape-count)` for the whole job, or for
	/// whatever subset the caller has already filtered (see
	/// [`Catalog::restore_job_files`] for the filter semantics); here it's
	/// computed directly in SQL for the "remaining" display.
	pub fn restore_job_stats(&self, job_id: RestoreJobId) -> Result<RestoreJobStats, CatalogError> {
		self.with_retry(|conn| {
			conn.query_row(
				"SELECT COUNT(*), COALESCE(SUM(f.filesize_encrypted), 0), COUNT(DISTINCT f.tape_id)
				 FROM restore_job_file_map m JOIN file f ON f.id = m.file_id
				 WHERE m.restore_job_id = ?1 AND m.restored = 0",
				[job_id],
				|row| {
					Ok(RestoreJobStats {
						count: row.get(0)?,
						total_size: row.get(1)?,
						distinct_tapes: row.get(2)?,
					})
				},
			)
		})
	}

	/// Per-tape breakdown of a restore job's still-unrestored files: label,
	/// file count, and total cipher-size bytes. This is the operator's
	/// "next tapes" cue after a `restore continue` round finds files whose
	/// tape isn't presently loaded (spec §4.6 `make_next_tapes_info`).
	pub fn restore_job_remaining_by_tape(
		&self,
		job_id: RestoreJobId,
	) -> Result<Vec<(String, i64, i64)>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare(
				"SELECT t.label, COUNT(*), COALESCE(SUM(f.filesize_encrypted), 0)
				 FROM restore_job_file_map m
				 JOIN file f ON f.id = m.file_id
				 JOIN tape t ON t.id = f.tape_id
				 WHERE m.restore_job_id = ?1 AND m.restored = 0
				 GROUP BY t.label
				 ORDER BY t.label",
			)?;
			let rows = stmt.query_map([job_id], |row| {
				Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
			})?;
			rows.collect()
		})
	}

	// ---- maintenance / status -------------------------------------------

	pub fn table_names(&self) -> Result<Vec<String>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt =
				conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
			let rows = stmt.query_map([], |row| row.get(0))?;
			rows.collect()
		})
	}

	pub fn row_counts(&self) -> Result<HashMap<String, i64>, CatalogError> {
		let tables = self.table_names()?;
		let mut counts = HashMap::new();
		for table in tables {
			let count: i64 = self.with_retry(|conn| {
				conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
			})?;
			counts.insert(table, count);
		}
		Ok(counts)
	}

	/// Per-column NULL counts for `table`, used by the `db status`
	/// diagnostic to surface partially-populated rows without a full dump.
	pub fn null_counts(&self, table: &str) -> Result<HashMap<String, i64>, CatalogError> {
		self.with_retry(|conn| {
			let mut columns_stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
			let columns: Vec<String> = columns_stmt
				.query_map([], |row| row.get::<_, String>(1))?
				.collect::<rusqlite::Result<_>>()?;

			let mut counts = HashMap::new();
			for column in columns {
				let null_count: i64 = conn.query_row(
					&format!("SELECT COUNT(*) FROM {table} WHERE {column} IS NULL"),
					[],
					|row| row.get(0),
				)?;
				counts.insert(column, null_count);
			}
			Ok(counts)
		})
	}

	/// Column name + declared SQL type, for the `db status` diagnostic.
	pub fn column_types(&self, table: &str) -> Result<Vec<(String, String)>, CatalogError> {
		self.with_retry(|conn| {
			let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
			let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?;
			rows.collect()
		})
	}

	/// Copy the whole database file to `dest`, used for the encrypted
	/// on-tape db backup and for `db backup`. Uses SQLite's own backup API
	/// rather than a raw file copy, so it is safe to run against a live
	/// connection.
	pub fn backup_to(&self, dest: impl AsRef<Path>) -> Result<(), CatalogError> {
		let conn = self.conn.lock().expect("catalog mutex poisoned");
		let mut dest_conn = Connection::open(dest.as_ref()).map_err(|source| CatalogError::Open {
			path: dest.as_ref().to_owned(),
			source,
		})?;
		let backup = rusqlite::backup::Backup::new(&conn, &mut dest_conn).map_err(CatalogError::Query)?;
		backup
			.run_to_completion(5, Duration::from_millis(250), None)
			.map_err(CatalogError::Query)?;
		debug!(dest = %dest.as_ref().display(), "catalog backed up");
		Ok(())
	}

	// ---- legacy import (`db migrate`) ------------------------------------

	/// Insert a tape row wholesale, preserving every legacy field instead of
	/// stamping fresh ones. Used only to carry rows forward from an old
	/// schema; normal operation always goes through [`Catalog::get_or_create_tape`].
	pub fn import_tape(&self, tape: &super::migrate::LegacyTape) -> Result<TapeId, CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"INSERT INTO tape (label, full_date, files_count, end_of_data, full, verified_count, verified_last)
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
				rusqlite::params![
					tape.label,
					tape.full_date,
					tape.files_count,
					tape.end_of_data,
					tape.full as i64,
					tape.verified_count,
					tape.verified_last,
				],
			)?;
			Ok(conn.last_insert_rowid())
		})
	}

	/// Insert a file row wholesale, preserving every legacy field. `tape_id`
	/// is the *new* catalog's tape id, already resolved by the caller from
	/// the legacy tape label.
	pub fn import_file(&self, file: &super::migrate::LegacyFile, tape_id: Option<TapeId>) -> Result<FileId, CatalogError> {
		self.with_retry(|conn| {
			conn.execute(
				"INSERT INTO file (duplicate_of, filename, path, filename_encrypted, mtime, filesize,
				 filesize_encrypted, hash_plaintext, hash_encrypted, tape_id, downloaded_date, encrypted_date,
				 written_date, tape_position, downloaded, encrypted, written, verified_count, verified_last, deleted)
				 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
				rusqlite::params![
					file.duplicate_of,
					file.filename,
					file.path,
					file.filename_encrypted,
					file.mtime,
					file.filesize,
					file.filesize_encrypted,
					file.hash_plaintext,
					file.hash_encrypted,
					tape_id,
					file.downloaded_date,
					file.encrypted_date,
					file.written_date,
					file.tape_position,
					file.downloaded as i64,
					file.encrypted as i64,
					file.written as i64,
					file.verified_count,
					file.verified_last,
					file.deleted as i64,
				],
			)?;
			Ok(conn.last_insert_rowid())
		})
	}
}

const FILE_COLUMNS: &str = "id, duplicate_of, filename, path, filename_encrypted, mtime, filesize,
	filesize_encrypted, hash_plaintext, hash_encrypted, tape_id, downloaded_date, encrypted_date,
	written_date, tape_position, downloaded, encrypted, written, verified_count, verified_last, deleted";

const SELECT_FILE: &str = "SELECT id, duplicate_of, filename, path, filename_encrypted, mtime, filesize,
	filesize_encrypted, hash_plaintext, hash_encrypted, tape_id, downloaded_date, encrypted_date,
	written_date, tape_position, downloaded, encrypted, written, verified_count, verified_last, deleted
	FROM file";

const SELECT_TAPE: &str = "SELECT id, label, full_date, files_count, end_of_data, full,
	verified_count, verified_last FROM tape";

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
	raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
		.map(|dt| dt.with_timezone(&Utc))
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
	row_to_file_offset(row, 0)
}

fn row_to_file_offset(row: &Row, o: usize) -> rusqlite::Result<File> {
	Ok(File {
		id: row.get(o)?,
		duplicate_of: row.get(o + 1)?,
		filename: row.get(o + 2)?,
		path: row.get(o + 3)?,
		filename_encrypted: row.get(o + 4)?,
		mtime: parse_ts(row.get(o + 5)?),
		filesize: row.get(o + 6)?,
		filesize_encrypted: row.get(o + 7)?,
		hash_plaintext: row.get(o + 8)?,
		hash_encrypted: row.get(o + 9)?,
		tape_id: row.get(o + 10)?,
		downloaded_date: parse_ts(row.get(o + 11)?),
		encrypted_date: parse_ts(row.get(o + 12)?),
		written_date: parse_ts(row.get(o + 13)?),
		tape_position: row.get(o + 14)?,
		downloaded: row.get(o + 15)?,
		encrypted: row.get(o + 16)?,
		written: row.get(o + 17)?,
		verified_count: row.get(o + 18)?,
		verified_last: parse_ts(row.get(o + 19)?),
		deleted: row.get(o + 20)?,
	})
}

fn row_to_tape(row: &Row) -> rusqlite::Result<Tape> {
	Ok(Tape {
		id: row.get(0)?,
		label: row.get(1)?,
		full_date: parse_ts(row.get(2)?),
		files_count: row.get(3)?,
		end_of_data: row.get(4)?,
		full: row.get(5)?,
		verified_count: row.get(6)?,
		verified_last: parse_ts(row.get(7)?),
	})
}

fn row_to_restore_job(row: &Row) -> rusqlite::Result<RestoreJob> {
	let started: String = row.get(1)?;
	Ok(RestoreJob {
		id: row.get(0)?,
		started: DateTime::parse_from_rfc3339(&started)
			.map(|dt| dt.with_timezone(&Utc))
			.unwrap_or_else(|_| Utc::now()),
		finished: parse_ts(row.get(2)?),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_and_fetch_file_roundtrips() {
		let cat = Catalog::open_in_memory().unwrap();
		let id = cat.insert_file("x.bin", "a/x.bin").unwrap();
		let file = cat.file_by_relpath("a/x.bin").unwrap().unwrap();
		assert_eq!(file.id, id);
		assert!(!file.downloaded);
		assert!(file.is_primary());
	}

	#[test]
	fn mark_downloaded_then_ready_to_encrypt() {
		let cat = Catalog::open_in_memory().unwrap();
		let id = cat.insert_file("x.bin", "a/x.bin").unwrap();
		cat.mark_downloaded(id, 1024, Utc::now(), "deadbeef").unwrap();

		let ready = cat.files_ready_to_encrypt().unwrap();
		assert_eq!(ready.len(), 1);
		assert_eq!(ready[0].id, id);
	}

	#[test]
	fn dedup_fold_marks_duplicate_with_no_heavy_fields() {
		let cat = Catalog::open_in_memory().unwrap();
		let primary = cat.insert_file("x.bin", "a/x.bin").unwrap();
		cat.mark_downloaded(primary, 1024, Utc::now(), "deadbeef").unwrap();

		let dup = cat.insert_file("y.bin", "a/y.bin").unwrap();
		cat.fold_into_duplicate(dup, primary).unwrap();

		let duplicates = cat.duplicates().unwrap();
		assert_eq!(duplicates.len(), 1);
		assert_eq!(duplicates[0].duplicate_of, Some(primary));
		assert!(duplicates[0].filesize.is_none());
		assert!(duplicates[0].hash_plaintext.is_none());
	}

	#[test]
	fn claim_encrypted_name_collision_returns_false() {
		let cat = Catalog::open_in_memory().unwrap();
		let a = cat.insert_file("a.bin", "a.bin").unwrap();
		let b = cat.insert_file("b.bin", "b.bin").unwrap();
		assert!(cat.claim_encrypted_name(a, "same.enc").unwrap());
		assert!(!cat.claim_encrypted_name(b, "same.enc").unwrap());
	}

	#[test]
	fn revert_written_by_tape_clears_attribution() {
		let cat = Catalog::open_in_memory().unwrap();
		let tape = cat.get_or_create_tape("BARCODE01L5").unwrap();
		let id = cat.insert_file("x.bin", "a/x.bin").unwrap();
		cat.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		cat.mark_encrypted(id, 20, "ch").unwrap();
		cat.mark_written(id, tape.id, Some(0)).unwrap();

		cat.revert_written_by_tape(tape.id).unwrap();

		let file = cat.file_by_id(id).unwrap().unwrap();
		assert!(!file.written);
		assert!(file.tape_id.is_none());
		assert!(file.written_date.is_none());
	}

	#[test]
	fn restore_job_lifecycle() {
		let cat = Catalog::open_in_memory().unwrap();
		let id = cat.insert_file("x.bin", "a/x.bin").unwrap();
		cat.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		cat.mark_encrypted(id, 20, "ch").unwrap();
		let tape = cat.get_or_create_tape("BARCODE02L5").unwrap();
		cat.mark_written(id, tape.id, Some(0)).unwrap();

		let job = cat.create_restore_job().unwrap();
		cat.add_restore_job_files(job, &[id]).unwrap();
		cat.mark_file_restored(job, id).unwrap();
		cat.finish_restore_job(job).unwrap();

		let fetched = cat.restore_job_by_id(job).unwrap().unwrap();
		assert!(fetched.finished.is_some());

		let stats = cat.restore_job_stats(job).unwrap();
		assert_eq!(stats.count, 0, "no files remain unrestored");
	}

	#[test]
	fn schema_version_round_trips() {
		let cat = Catalog::open_in_memory().unwrap();
		assert_eq!(cat.schema_version().unwrap(), None);
		cat.set_schema_version(EXPECTED_SCHEMA_VERSION).unwrap();
		assert_eq!(cat.schema_version().unwrap(), Some(EXPECTED_SCHEMA_VERSION));
	}
}

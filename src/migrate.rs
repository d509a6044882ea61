//! One-shot legacy-schema migration, backing `db migrate`.
//!
//! The original tool kept a standing SQLAlchemy migrator that walked every
//! `tapedevices`/`files`/`alternative_file_names` row across into a fresh
//! ORM-managed database. That full object-relational translation is out of
//! scope here; what this module keeps is the contract a caller actually
//! depends on: point it at a database file, it builds a current-schema
//! catalog next to it, carries over whatever legacy rows it recognises,
//! keeps a timestamped backup of the original, and swaps the files in
//! atomically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::{
	catalog::{
		model::{FileId, TapeId},
		Catalog, EXPECTED_SCHEMA_VERSION,
	},
	error::CatalogError,
};

/// A `tape` row as read from a pre-migration database, legacy column names
/// (`tapedevices`) already translated to the current ones.
#[derive(Debug, Clone)]
pub struct LegacyTape {
	pub label: String,
	pub full_date: Option<String>,
	pub files_count: Option<i64>,
	pub end_of_data: Option<i64>,
	pub full: bool,
	pub verified_count: i64,
	pub verified_last: Option<String>,
}

/// A `file` row as read from a pre-migration database. `duplicate_of` is
/// resolved to the *new* catalog's id by the time this reaches
/// [`Catalog::import_file`]; the legacy id it started as is kept alongside
/// in [`migrate`]'s own bookkeeping, not here.
#[derive(Debug, Clone)]
pub struct LegacyFile {
	pub duplicate_of: Option<FileId>,
	pub filename: String,
	pub path: String,
	pub filename_encrypted: Option<String>,
	pub mtime: Option<String>,
	pub filesize: Option<i64>,
	pub filesize_encrypted: Option<i64>,
	pub hash_plaintext: Option<String>,
	pub hash_encrypted: Option<String>,
	pub downloaded_date: Option<String>,
	pub encrypted_date: Option<String>,
	pub written_date: Option<String>,
	pub tape_position: Option<i64>,
	pub downloaded: bool,
	pub encrypted: bool,
	pub written: bool,
	pub verified_count: i64,
	pub verified_last: Option<String>,
	pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MigrateSummary {
	/// The catalog was already at [`EXPECTED_SCHEMA_VERSION`]; nothing done.
	pub already_current: bool,
	pub tapes_migrated: usize,
	pub files_migrated: usize,
	pub backup_path: Option<PathBuf>,
}

/// Migrate the catalog at `path` in place.
///
/// - If `path` doesn't exist yet, a fresh catalog is created and stamped
///   with [`EXPECTED_SCHEMA_VERSION`] — the common first-run case.
/// - If it exists and is already at the current version, this is a no-op
///   (`already_current`).
/// - Otherwise the file is opened as a legacy SQLAlchemy-era database
///   (`tapedevices` / `files` tables): every row is carried into a
///   freshly built catalog at a sibling path, the original is renamed
///   aside with a timestamp, and the new file takes its place.
pub fn migrate(path: &Path, now: DateTime<Utc>) -> Result<MigrateSummary, CatalogError> {
	if !path.exists() {
		let fresh = Catalog::open(path)?;
		fresh.set_schema_version(EXPECTED_SCHEMA_VERSION)?;
		return Ok(MigrateSummary::default());
	}

	{
		let probe = Catalog::open(path)?;
		if probe.schema_version()? == Some(EXPECTED_SCHEMA_VERSION) {
			return Ok(MigrateSummary {
				already_current: true,
				..Default::default()
			});
		}
	}

	let legacy = Connection::open(path).map_err(|source| CatalogError::Open {
		path: path.to_owned(),
		source,
	})?;

	let stamp = now.format("%Y%m%dT%H%M%SZ");
	let staged_path = sibling_path(path, &format!("migrate-new-{stamp}"));
	let backup_path = sibling_path(path, &format!("pre-migrate-{stamp}"));

	let staged = Catalog::open(&staged_path)?;

	let mut summary = MigrateSummary::default();

	if table_exists(&legacy, "tapedevices")? {
		let mut tape_ids = std::collections::HashMap::new();
		let mut stmt = legacy
			.prepare(
				"SELECT label, full_date, files_count, end_of_data, full, verified_count, verified_last
				 FROM tapedevices",
			)
			.map_err(CatalogError::Query)?;
		let rows = stmt
			.query_map([], |row| {
				Ok(LegacyTape {
					label: row.get(0)?,
					full_date: row.get(1)?,
					files_count: row.get(2)?,
					end_of_data: row.get(3)?,
					full: row.get::<_, i64>(4)? != 0,
					verified_count: row.get(5)?,
					verified_last: row.get(6)?,
				})
			})
			.map_err(CatalogError::Query)?;
		for row in rows {
			let tape = row.map_err(CatalogError::Query)?;
			let label = tape.label.clone();
			let new_id = staged.import_tape(&tape)?;
			tape_ids.insert(label, new_id);
			summary.tapes_migrated += 1;
		}

		if table_exists(&legacy, "files")? {
			migrate_files(&legacy, &staged, &tape_ids, &mut summary)?;
		}
	}

	staged.set_schema_version(EXPECTED_SCHEMA_VERSION)?;
	drop(staged);
	drop(legacy);

	std::fs::rename(path, &backup_path).map_err(|source| CatalogError::Io {
		path: backup_path.clone(),
		source,
	})?;
	std::fs::rename(&staged_path, path).map_err(|source| CatalogError::Io {
		path: staged_path.clone(),
		source,
	})?;

	summary.backup_path = Some(backup_path);
	Ok(summary)
}

/// Two passes over `files`: primaries first (so their new ids are known),
/// then duplicates, resolving `duplicate_id`/`parent file path` against the
/// primaries just inserted. Mirrors the old tool's own two-table split
/// (`files` vs `alternative_file_names`) without the ORM in between.
fn migrate_files(
	legacy: &Connection,
	staged: &Catalog,
	tape_ids: &std::collections::HashMap<String, TapeId>,
	summary: &mut MigrateSummary,
) -> Result<(), CatalogError> {
	let mut path_to_new_id = std::collections::HashMap::new();

	let mut stmt = legacy
		.prepare(
			"SELECT filename, path, filename_encrypted, mtime, filesize, filesize_encrypted,
			 md5sum_file, md5sum_encrypted, tape, downloaded_date, encrypted_date, written_date,
			 tapeposition, downloaded, encrypted, written, verified_count, verified_last, deleted
			 FROM files WHERE duplicate_id IS NULL",
		)
		.map_err(CatalogError::Query)?;
	let rows = stmt
		.query_map([], |row| {
			let tape_label: Option<String> = row.get(8)?;
			Ok((
				tape_label,
				LegacyFile {
					duplicate_of: None,
					filename: row.get(0)?,
					path: row.get(1)?,
					filename_encrypted: row.get(2)?,
					mtime: row.get(3)?,
					filesize: row.get(4)?,
					filesize_encrypted: row.get(5)?,
					hash_plaintext: row.get(6)?,
					hash_encrypted: row.get(7)?,
					downloaded_date: row.get(9)?,
					encrypted_date: row.get(10)?,
					written_date: row.get(11)?,
					tape_position: row.get(12)?,
					downloaded: row.get::<_, i64>(13)? != 0,
					encrypted: row.get::<_, i64>(14)? != 0,
					written: row.get::<_, i64>(15)? != 0,
					verified_count: row.get(16)?,
					verified_last: row.get(17)?,
					deleted: row.get::<_, i64>(18)? != 0,
				},
			))
		})
		.map_err(CatalogError::Query)?;
	for row in rows {
		let (tape_label, file) = row.map_err(CatalogError::Query)?;
		let tape_id = tape_label.and_then(|label| tape_ids.get(&label).copied());
		let path = file.path.clone();
		let new_id = staged.import_file(&file, tape_id)?;
		path_to_new_id.insert(path, new_id);
		summary.files_migrated += 1;
	}

	if !table_exists(legacy, "alternative_file_names")? {
		return Ok(());
	}

	let mut stmt = legacy
		.prepare(
			"SELECT a.filename, a.path, f.path AS parent_path, a.mtime, a.deleted
			 FROM alternative_file_names a
			 JOIN files f ON f.id = a.parent_file_id",
		)
		.map_err(CatalogError::Query)?;
	let dup_rows = stmt
		.query_map([], |row| {
			Ok((
				row.get::<_, String>(2)?,
				LegacyFile {
					duplicate_of: None,
					filename: row.get(0)?,
					path: row.get(1)?,
					filename_encrypted: None,
					mtime: row.get(3)?,
					filesize: None,
					filesize_encrypted: None,
					hash_plaintext: None,
					hash_encrypted: None,
					downloaded_date: None,
					encrypted_date: None,
					written_date: None,
					tape_position: None,
					downloaded: false,
					encrypted: false,
					written: false,
					verified_count: 0,
					verified_last: None,
					deleted: row.get::<_, i64>(4)? != 0,
				},
			))
		})
		.map_err(CatalogError::Query)?;
	for row in dup_rows {
		let (parent_path, mut dup) = row.map_err(CatalogError::Query)?;
		let Some(&parent_id) = path_to_new_id.get(&parent_path) else {
			continue;
		};
		dup.duplicate_of = Some(parent_id);
		staged.import_file(&dup, None)?;
		summary.files_migrated += 1;
	}

	Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, CatalogError> {
	conn.query_row(
		"SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
		[name],
		|_| Ok(()),
	)
	.optional()
	.map(|found| found.is_some())
	.map_err(CatalogError::Query)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(format!(".{suffix}"));
	path.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn migrate_creates_fresh_catalog_when_absent() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("catalog.db");

		let summary = migrate(&path, Utc::now()).unwrap();
		assert!(!summary.already_current);
		assert_eq!(summary.tapes_migrated, 0);

		let catalog = Catalog::open(&path).unwrap();
		assert_eq!(catalog.schema_version().unwrap(), Some(EXPECTED_SCHEMA_VERSION));
	}

	#[test]
	fn migrate_is_a_no_op_when_already_current() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("catalog.db");
		Catalog::open(&path)
			.unwrap()
			.set_schema_version(EXPECTED_SCHEMA_VERSION)
			.unwrap();

		let summary = migrate(&path, Utc::now()).unwrap();
		assert!(summary.already_current);
	}

	#[test]
	fn migrate_carries_legacy_tapes_and_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("catalog.db");

		{
			let conn = Connection::open(&path).unwrap();
			conn.execute_batch(
				"CREATE TABLE tapedevices (label TEXT, full_date TEXT, files_count INTEGER,
				 end_of_data INTEGER, full INTEGER, verified_count INTEGER, verified_last TEXT);
				 CREATE TABLE files (id INTEGER PRIMARY KEY, duplicate_id INTEGER, filename TEXT,
				 path TEXT, filename_encrypted TEXT, mtime TEXT, filesize INTEGER,
				 filesize_encrypted INTEGER, md5sum_file TEXT, md5sum_encrypted TEXT, tape TEXT,
				 downloaded_date TEXT, encrypted_date TEXT, written_date TEXT, tapeposition INTEGER,
				 downloaded INTEGER, encrypted INTEGER, written INTEGER, verified_count INTEGER,
				 verified_last TEXT, deleted INTEGER);
				 CREATE TABLE alternative_file_names (filename TEXT, path TEXT,
				 parent_file_id INTEGER, mtime TEXT, deleted INTEGER);",
			)
			.unwrap();
			conn.execute(
				"INSERT INTO tapedevices VALUES ('LTO001L8', NULL, 1, 100, 0, 0, NULL)",
				[],
			)
			.unwrap();
			conn.execute(
				"INSERT INTO files VALUES (1, NULL, 'a.txt', '/a.txt', 'opaque1', NULL, 10, 12,
				 'hash1', 'hashe1', 'LTO001L8', NULL, NULL, NULL, 0, 1, 1, 1, 0, NULL, 0)",
				[],
			)
			.unwrap();
			conn.execute(
				"INSERT INTO alternative_file_names VALUES ('a-copy.txt', '/a-copy.txt', 1, NULL, 0)",
				[],
			)
			.unwrap();
		}

		let summary = migrate(&path, Utc::now()).unwrap();
		assert_eq!(summary.tapes_migrated, 1);
		assert_eq!(summary.files_migrated, 2);
		assert!(summary.backup_path.unwrap().exists());

		let catalog = Catalog::open(&path).unwrap();
		assert_eq!(catalog.schema_version().unwrap(), Some(EXPECTED_SCHEMA_VERSION));
		let primary = catalog.file_by_relpath("/a.txt").unwrap().unwrap();
		assert!(primary.written);
		let dup = catalog.file_by_relpath("/a-copy.txt").unwrap().unwrap();
		assert_eq!(dup.duplicate_of, Some(primary.id));
	}
}

//! SQL DDL for the catalog database.
//!
//! Kept as plain `CREATE TABLE IF NOT EXISTS` statements rather than a
//! migration framework: the schema is small and stable, and `migrate()`
//! only ever adds columns/indexes, never drops them.

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS config (
	key TEXT PRIMARY KEY,
	value TEXT
);

CREATE TABLE IF NOT EXISTS tape (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	label TEXT NOT NULL UNIQUE,
	full_date TEXT,
	files_count INTEGER,
	end_of_data INTEGER,
	full INTEGER NOT NULL DEFAULT 0,
	verified_count INTEGER NOT NULL DEFAULT 0,
	verified_last TEXT
);

CREATE TABLE IF NOT EXISTS file (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	duplicate_of INTEGER REFERENCES file(id),
	filename TEXT NOT NULL,
	path TEXT NOT NULL,
	filename_encrypted TEXT,
	mtime TEXT,
	filesize INTEGER,
	filesize_encrypted INTEGER,
	hash_plaintext TEXT,
	hash_encrypted TEXT,
	tape_id INTEGER REFERENCES tape(id),
	downloaded_date TEXT,
	encrypted_date TEXT,
	written_date TEXT,
	tape_position INTEGER,
	downloaded INTEGER NOT NULL DEFAULT 0,
	encrypted INTEGER NOT NULL DEFAULT 0,
	written INTEGER NOT NULL DEFAULT 0,
	verified_count INTEGER NOT NULL DEFAULT 0,
	verified_last TEXT,
	deleted INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_file_path ON file (path);
CREATE UNIQUE INDEX IF NOT EXISTS ux_file_filename_encrypted ON file (filename_encrypted);
CREATE INDEX IF NOT EXISTS ix_file_hash_plaintext ON file (hash_plaintext);
CREATE INDEX IF NOT EXISTS ix_file_duplicate_of ON file (duplicate_of);
CREATE INDEX IF NOT EXISTS ix_file_tape_id ON file (tape_id);
CREATE INDEX IF NOT EXISTS ix_file_stage_flags ON file (downloaded, encrypted, written);

CREATE TABLE IF NOT EXISTS restore_job (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	started TEXT NOT NULL,
	finished TEXT
);

CREATE TABLE IF NOT EXISTS restore_job_file_map (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	restored INTEGER NOT NULL DEFAULT 0,
	file_id INTEGER NOT NULL REFERENCES file(id),
	restore_job_id INTEGER NOT NULL REFERENCES restore_job(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_rjfm_file_job ON restore_job_file_map (file_id, restore_job_id);
CREATE INDEX IF NOT EXISTS ix_rjfm_job ON restore_job_file_map (restore_job_id);
"#;

//! Row types for the catalog tables.
//!
//! These mirror the entities in the data model: a primary [`File`] owns every
//! size/hash/tape field, while a duplicate carries only naming and timestamp
//! metadata and points at its primary via `duplicate_of`.

use chrono::{DateTime, Utc};

pub type FileId = i64;
pub type TapeId = i64;
pub type RestoreJobId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct File {
	pub id: FileId,
	pub duplicate_of: Option<FileId>,
	pub filename: String,
	pub path: String,
	pub filename_encrypted: Option<String>,
	pub mtime: Option<DateTime<Utc>>,
	pub filesize: Option<i64>,
	pub filesize_encrypted: Option<i64>,
	pub hash_plaintext: Option<String>,
	pub hash_encrypted: Option<String>,
	pub tape_id: Option<TapeId>,
	pub downloaded_date: Option<DateTime<Utc>>,
	pub encrypted_date: Option<DateTime<Utc>>,
	pub written_date: Option<DateTime<Utc>>,
	pub tape_position: Option<i64>,
	pub downloaded: bool,
	pub encrypted: bool,
	pub written: bool,
	pub verified_count: i64,
	pub verified_last: Option<DateTime<Utc>>,
	pub deleted: bool,
}

impl File {
	/// A primary file owns every size/hash/tape/stage field; a duplicate
	/// owns only naming and timestamp metadata. See `duplicate_of`.
	pub fn is_primary(&self) -> bool {
		self.duplicate_of.is_none()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tape {
	pub id: TapeId,
	pub label: String,
	pub full_date: Option<DateTime<Utc>>,
	pub files_count: Option<i64>,
	pub end_of_data: Option<i64>,
	pub full: bool,
	pub verified_count: i64,
	pub verified_last: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreJob {
	pub id: RestoreJobId,
	pub started: DateTime<Utc>,
	pub finished: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreJobFileMap {
	pub id: i64,
	pub restored: bool,
	pub file_id: FileId,
	pub restore_job_id: RestoreJobId,
}

/// Aggregate stats for a restore job: file count, total bytes, distinct tapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreJobStats {
	pub count: i64,
	pub total_size: i64,
	pub distinct_tapes: i64,
}

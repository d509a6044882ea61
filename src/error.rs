//! Typed error enums for the catalog, tape library, and cipher layers.
//!
//! Action handlers convert these into [`miette::Report`] with
//! [`miette::IntoDiagnostic`]; the enums themselves stay free of miette so
//! that library code (catalog, tapelib) can be used without pulling in the
//! diagnostic renderer.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::model::{FileId, TapeId};

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("opening catalog database at {path}")]
	Open {
		path: PathBuf,
		#[source]
		source: rusqlite::Error,
	},

	#[error("running catalog migrations")]
	Migration(#[source] rusqlite::Error),

	#[error("catalog query failed")]
	Query(#[source] rusqlite::Error),

	#[error("file {0} not found in catalog")]
	FileNotFound(FileId),

	#[error("tape {0} not found in catalog")]
	TapeNotFound(TapeId),

	#[error("tape label {0:?} already exists")]
	DuplicateTapeLabel(String),

	#[error("catalog busy after {retries} retries")]
	Busy { retries: u32 },

	#[error("filesystem operation on catalog file {path}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

#[derive(Debug, Error)]
pub enum TapeError {
	#[error("running tape tool `{tool}`")]
	ToolFailed {
		tool: &'static str,
		#[source]
		source: std::io::Error,
	},

	#[error("tape tool `{tool}` exited with non-zero status: {stderr}")]
	ToolError { tool: &'static str, stderr: String },

	#[error("no tape loaded in drive {drive}")]
	NoTapeLoaded { drive: u32 },

	#[error("mounting LTFS filesystem at {mountpoint}")]
	MountFailed { mountpoint: PathBuf },

	#[error("tape is full, cannot write {bytes} more bytes ({free} free)")]
	TapeFull { bytes: u64, free: u64 },

	#[error("tape library has no free slot to load a fresh tape")]
	NoFreeTape,

	#[error("raw TAR drive at {device} reported an error: {detail}")]
	DriveError { device: PathBuf, detail: String },
}

#[derive(Debug, Error)]
pub enum VerifyError {
	#[error("hash mismatch for {path}: expected {expected}, got {actual}")]
	HashMismatch {
		path: PathBuf,
		expected: String,
		actual: String,
	},

	#[error("file {0} missing from tape during verification")]
	MissingOnTape(FileId),

	#[error("reading back from tape for verification")]
	ReadBack(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CipherError {
	#[error("encrypting stream")]
	Encrypt(#[source] age::EncryptError),

	#[error("decrypting stream")]
	Decrypt(#[source] age::DecryptError),

	#[error("the encryption key must be at least {min} bytes long, got {actual}")]
	KeyTooShort { min: usize, actual: usize },

	#[error("reading encryption key from {path}")]
	KeyRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

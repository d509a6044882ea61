//! `db repair`: recovers from the two classes of stale catalog state a
//! crash mid-Ingest or mid-Encrypt can leave behind, plus an interactive
//! sweep for `files-ready-to-write` rows whose cipher file has vanished
//! from disk.

use std::path::Path;

use dialoguer::{theme::ColorfulTheme, Select};
use miette::{miette, Result};
use tracing::info;

use crate::catalog::Catalog;

#[derive(Debug, Default, Clone, Copy)]
pub struct RepairSummary {
	pub broken_downloads_removed: usize,
	pub broken_encrypts_reset: usize,
	pub missing_ciphers_deleted: usize,
}

/// Broken-download: `downloaded=false` and not a duplicate → delete the
/// row outright, there is nothing durable to recover.
pub fn repair_broken_downloads(catalog: &Catalog) -> Result<usize> {
	let rows = catalog.not_deleted_files().map_err(|err| miette!("{err}"))?;
	let mut removed = 0;
	for file in rows {
		if !file.downloaded && file.duplicate_of.is_none() {
			catalog.delete_file(file.id).map_err(|err| miette!("{err}"))?;
			info!(file = file.id, path = %file.path, "removed broken-download row");
			removed += 1;
		}
	}
	Ok(removed)
}

/// Broken-encrypt: an encrypted-name claim exists but `encrypted=false` —
/// the worker died between claiming the name and finishing the cipher
/// write. Delete any partial ciphertext, clear the claim, and leave the
/// row `downloaded=true` so Encrypt picks it back up.
pub fn repair_broken_encrypts(catalog: &Catalog, local_enc_dir: &Path) -> Result<usize> {
	let rows = catalog.files_ready_to_encrypt().map_err(|err| miette!("{err}"))?;
	let mut reset = 0;
	for file in rows {
		if let Some(opaque) = &file.filename_encrypted {
			let partial = local_enc_dir.join(opaque);
			if partial.exists() {
				let _ = std::fs::remove_file(&partial);
			}
			catalog
				.clear_encrypted_name_claim(file.id)
				.map_err(|err| miette!("{err}"))?;
			info!(file = file.id, %opaque, "reset broken-encrypt row");
			reset += 1;
		}
	}
	Ok(reset)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptChoice {
	Yes,
	No,
	All,
	NoToAll,
}

/// Find `files-ready-to-write` rows whose cipher file is missing from
/// `local_enc_dir`, and offer each for deletion with the `[Y/n/a/2]`
/// per-row prompt. Non-interactive callers pass
/// `auto_delete = Some(true/false)` to skip the prompt entirely.
pub fn repair_missing_ciphers(
	catalog: &Catalog,
	local_enc_dir: &Path,
	auto_delete: Option<bool>,
) -> Result<usize> {
	let rows = catalog.files_ready_to_write().map_err(|err| miette!("{err}"))?;
	let missing: Vec<_> = rows
		.into_iter()
		.filter(|f| {
			f.filename_encrypted
				.as_ref()
				.map(|name| !local_enc_dir.join(name).exists())
				.unwrap_or(false)
		})
		.collect();

	let mut deleted = 0;
	let mut blanket: Option<bool> = auto_delete;

	for file in missing {
		let delete = match blanket {
			Some(choice) => choice,
			None => match prompt_one(&file.path)? {
				PromptChoice::Yes => true,
				PromptChoice::No => false,
				PromptChoice::All => {
					blanket = Some(true);
					true
				}
				PromptChoice::NoToAll => {
					blanket = Some(false);
					false
				}
			},
		};

		if delete {
			catalog.delete_file(file.id).map_err(|err| miette!("{err}"))?;
			info!(file = file.id, path = %file.path, "deleted row with missing cipher file");
			deleted += 1;
		}
	}

	Ok(deleted)
}

fn prompt_one(path: &str) -> Result<PromptChoice> {
	let options = ["Yes", "No", "All (delete remaining)", "No to all"];
	let selection = Select::with_theme(&ColorfulTheme::default())
		.with_prompt(format!("cipher file missing for {path}, delete catalog row?"))
		.items(&options)
		.default(0)
		.interact()
		.map_err(|err| miette!("reading prompt response: {err}"))?;

	Ok(match selection {
		0 => PromptChoice::Yes,
		1 => PromptChoice::No,
		2 => PromptChoice::All,
		_ => PromptChoice::NoToAll,
	})
}

pub fn run(catalog: &Catalog, local_enc_dir: &Path, auto_delete: Option<bool>) -> Result<RepairSummary> {
	Ok(RepairSummary {
		broken_downloads_removed: repair_broken_downloads(catalog)?,
		broken_encrypts_reset: repair_broken_encrypts(catalog, local_enc_dir)?,
		missing_ciphers_deleted: repair_missing_ciphers(catalog, local_enc_dir, auto_delete)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	#[test]
	fn removes_broken_download_rows_only() {
		let catalog = Catalog::open_in_memory().unwrap();
		let broken = catalog.insert_file("a.bin", "a.bin").unwrap();
		let good = catalog.insert_file("b.bin", "b.bin").unwrap();
		catalog.mark_downloaded(good, 10, Utc::now(), "h").unwrap();

		let removed = repair_broken_downloads(&catalog).unwrap();
		assert_eq!(removed, 1);
		assert!(catalog.file_by_id(broken).unwrap().is_none());
		assert!(catalog.file_by_id(good).unwrap().is_some());
	}

	#[test]
	fn resets_broken_encrypt_claim_and_removes_partial_file() {
		let catalog = Catalog::open_in_memory().unwrap();
		let dir = tempfile::tempdir().unwrap();
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		catalog.claim_encrypted_name(id, "partial.enc").unwrap();
		std::fs::write(dir.path().join("partial.enc"), b"half written").unwrap();

		let reset = repair_broken_encrypts(&catalog, dir.path()).unwrap();
		assert_eq!(reset, 1);
		assert!(!dir.path().join("partial.enc").exists());

		let file = catalog.file_by_id(id).unwrap().unwrap();
		assert!(file.filename_encrypted.is_none());
		assert!(!file.encrypted);
		assert!(file.downloaded);
	}

	#[test]
	fn auto_delete_true_removes_rows_with_missing_cipher_files() {
		let catalog = Catalog::open_in_memory().unwrap();
		let dir = tempfile::tempdir().unwrap();
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		catalog.claim_encrypted_name(id, "gone.enc").unwrap();
		catalog.mark_encrypted(id, 10, "ch").unwrap();

		let deleted = repair_missing_ciphers(&catalog, dir.path(), Some(true)).unwrap();
		assert_eq!(deleted, 1);
		assert!(catalog.file_by_id(id).unwrap().is_none());
	}

	#[test]
	fn repair_is_idempotent_on_a_clean_catalog() {
		let catalog = Catalog::open_in_memory().unwrap();
		let dir = tempfile::tempdir().unwrap();
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();

		let first = run(&catalog, dir.path(), Some(false)).unwrap();
		let second = run(&catalog, dir.path(), Some(false)).unwrap();
		assert_eq!(first.broken_downloads_removed, 0);
		assert_eq!(second.broken_downloads_removed, 0);
		assert!(catalog.file_by_id(id).unwrap().is_some());
	}
}

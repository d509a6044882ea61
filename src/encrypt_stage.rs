//! Encryption Stage: takes every row marked `downloaded` and not yet
//! `encrypted`, assigns it an opaque on-tape name, encrypts its bytes, and
//! records the result.
//!
//! Opaque names are claimed optimistically against the catalog's UNIQUE
//! constraint on `filename_encrypted` — a collision just
//! means "draw another name and try again", not a hard error.

use std::{path::PathBuf, sync::Arc};

use miette::{miette, IntoDiagnostic as _, Result};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
	catalog::{model::FileId, Catalog},
	cipher::CipherTool,
	hashing::hash_file,
	pathutil::random_opaque_name,
};

/// How many opaque-name collisions to tolerate before giving up on one
/// file — a name space of 64 alphanumeric characters makes more than a
/// couple of collisions in a row a sign something else is wrong.
const MAX_NAME_ATTEMPTS: u32 = 8;

pub struct EncryptContext {
	pub catalog: Arc<Catalog>,
	pub cipher: Arc<dyn CipherTool>,
	pub local_data_dir: PathBuf,
	pub local_enc_dir: PathBuf,
	pub worker_count: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptSummary {
	pub encrypted: usize,
	pub failures: usize,
}

#[instrument(level = "info", skip_all)]
pub async fn run(ctx: &EncryptContext, cancel: &CancellationToken) -> Result<EncryptSummary> {
	let ready = ctx.catalog.files_ready_to_encrypt().map_err(|err| miette!("{err}"))?;
	info!(count = ready.len(), "files ready to encrypt");

	let semaphore = Arc::new(Semaphore::new(ctx.worker_count.max(1)));
	let mut tasks = JoinSet::new();
	let mut summary = EncryptSummary::default();

	for file in ready {
		if cancel.is_cancelled() {
			info!("interrupted, draining in-flight encrypt workers");
			break;
		}
		let permit = semaphore.clone().acquire_owned().await.into_diagnostic()?;
		let catalog = ctx.catalog.clone();
		let cipher = ctx.cipher.clone();
		let local_data_dir = ctx.local_data_dir.clone();
		let local_enc_dir = ctx.local_enc_dir.clone();

		tasks.spawn(async move {
			let _permit = permit;
			encrypt_one(&catalog, &*cipher, &local_data_dir, &local_enc_dir, file.id, &file.path).await
		});
	}

	while let Some(result) = tasks.join_next().await {
		match result.into_diagnostic()? {
			Ok(()) => summary.encrypted += 1,
			Err(err) => {
				warn!(%err, "encrypt worker failed for one file");
				summary.failures += 1;
			}
		}
	}

	Ok(summary)
}

#[instrument(level = "debug", skip(catalog, cipher, local_data_dir, local_enc_dir))]
async fn encrypt_one(
	catalog: &Catalog,
	cipher: &dyn CipherTool,
	local_data_dir: &std::path::Path,
	local_enc_dir: &std::path::Path,
	id: FileId,
	relative_path: &str,
) -> Result<()> {
	let opaque_name = claim_opaque_name(catalog, id).await?;
	let plaintext = local_data_dir.join(relative_path);
	let ciphertext = local_enc_dir.join(&opaque_name);

	if let Some(parent) = ciphertext.parent() {
		tokio::fs::create_dir_all(parent).await.into_diagnostic()?;
	}

	match cipher.encrypt_file(&plaintext, &ciphertext).await {
		Ok(filesize_encrypted) => {
			let hash_encrypted = hash_file(&ciphertext).await?;
			catalog
				.mark_encrypted(id, filesize_encrypted as i64, &hash_encrypted)
				.map_err(|err| miette!("{err}"))?;
			debug!(file = id, %opaque_name, "encrypted");
			Ok(())
		}
		Err(err) => {
			// Undo the name claim so a retry of this file doesn't find a
			// stage-1-complete-but-no-ciphertext row stuck forever.
			let _ = catalog.clear_encrypted_name_claim(id);
			let _ = tokio::fs::remove_file(&ciphertext).await;
			Err(err)
		}
	}
}

async fn claim_opaque_name(catalog: &Catalog, id: FileId) -> Result<String> {
	for attempt in 0..MAX_NAME_ATTEMPTS {
		let candidate = random_opaque_name();
		if catalog
			.claim_encrypted_name(id, &candidate)
			.map_err(|err| miette!("{err}"))?
		{
			return Ok(candidate);
		}
		warn!(file = id, attempt, "opaque name collision, retrying");
	}
	Err(miette!(
		"could not find an unused opaque name for file {id} after {MAX_NAME_ATTEMPTS} attempts"
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cipher::AgePassphraseCipher;
	use chrono::Utc;

	fn test_cipher() -> Arc<dyn CipherTool> {
		Arc::new(AgePassphraseCipher::new(&"x".repeat(128)).unwrap())
	}

	#[tokio::test]
	async fn encrypts_ready_files_and_marks_them() {
		let dir = tempfile::tempdir().unwrap();
		let data_dir = dir.path().join("data");
		let enc_dir = dir.path().join("enc");
		tokio::fs::create_dir_all(&data_dir).await.unwrap();
		tokio::fs::create_dir_all(&enc_dir).await.unwrap();
		tokio::fs::write(data_dir.join("a.bin"), b"plaintext bytes").await.unwrap();

		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 15, Utc::now(), "hash").unwrap();

		let ctx = EncryptContext {
			catalog: catalog.clone(),
			cipher: test_cipher(),
			local_data_dir: data_dir,
			local_enc_dir: enc_dir.clone(),
			worker_count: 2,
		};
		let cancel = CancellationToken::new();

		let summary = run(&ctx, &cancel).await.unwrap();
		assert_eq!(summary.encrypted, 1);
		assert_eq!(summary.failures, 0);

		let file = catalog.file_by_id(id).unwrap().unwrap();
		assert!(file.encrypted);
		assert!(file.filename_encrypted.is_some());
		let ciphertext = enc_dir.join(file.filename_encrypted.unwrap());
		assert!(ciphertext.exists());
	}

	#[tokio::test]
	async fn already_encrypted_files_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "hash").unwrap();
		catalog.claim_encrypted_name(id, "x.enc").unwrap();
		catalog.mark_encrypted(id, 10, "hash2").unwrap();

		let ctx = EncryptContext {
			catalog: catalog.clone(),
			cipher: test_cipher(),
			local_data_dir: dir.path().to_owned(),
			local_enc_dir: dir.path().to_owned(),
			worker_count: 1,
		};

		let summary = run(&ctx, &CancellationToken::new()).await.unwrap();
		assert_eq!(summary.encrypted, 0);
	}
}

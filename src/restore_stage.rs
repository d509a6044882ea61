//! Restore Stage: plans a job against a set of file patterns, then works
//! through however many tapes that selection spans, loading each tape at
//! most once.
//!
//! A restore job is durable: [`start`] persists the full file selection
//! into `restore_job_file_map` before a single byte moves, so
//! [`continue_job`] can resume after an interruption by simply asking the
//! catalog which rows are still unrestored.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use miette::{miette, Context as _, IntoDiagnostic as _, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
	catalog::{
		model::{File, RestoreJob, RestoreJobId, RestoreJobStats, TapeId},
		Catalog,
	},
	cipher::CipherTool,
	pathutil::ltfs_start_block,
	tapelib::TapeLibrary,
};

pub struct RestoreContext {
	pub catalog: Arc<Catalog>,
	pub tapelib: Arc<dyn TapeLibrary>,
	pub cipher: Arc<dyn CipherTool>,
	pub dest_dir: PathBuf,
}

/// Select files by glob `patterns` (optionally narrowed to one tape) and
/// persist them as a new restore job, not yet started. Only `written`
/// files are restorable — nothing can be pulled off a tape that was never
/// burned.
#[instrument(level = "info", skip(catalog))]
pub fn start(catalog: &Catalog, patterns: &[String], tape: Option<&str>) -> Result<RestoreJobId> {
	for pattern in patterns {
		if !pattern.contains('*') {
			let hits = catalog
				.files_matching(std::slice::from_ref(pattern), tape, Some(true))
				.map_err(|err| miette!("{err}"))?;
			if hits.is_empty() {
				warn!(pattern, "literal pattern matched no written files");
			}
		}
	}

	let files = catalog
		.files_matching(patterns, tape, Some(true))
		.map_err(|err| miette!("{err}"))?;
	if files.is_empty() {
		return Err(miette!("no written files match the given selection"));
	}

	let job_id = catalog.create_restore_job().map_err(|err| miette!("{err}"))?;
	let ids: Vec<_> = files.iter().map(|f| f.id).collect();
	catalog
		.add_restore_job_files(job_id, &ids)
		.map_err(|err| miette!("{err}"))?;

	info!(job_id, files = ids.len(), "restore job planned");
	Ok(job_id)
}

#[derive(Debug, Default, Clone)]
pub struct RestoreProgress {
	pub restored: usize,
	pub failures: usize,
	/// `(tape label, files remaining, bytes remaining)`, sorted by label —
	/// the operator's cue for which tape to load next, built fresh after
	/// every round so a job that isn't finished always says what's left.
	pub remaining_by_tape: Vec<(String, i64, i64)>,
}

/// Resume (or begin executing) `job_id`: restore only the still-unrestored
/// files whose tape is presently available in the library (`enumerate_tapes`),
/// loading each such tape once and decrypting its files onto `ctx.dest_dir`
/// in on-tape order. Files on a tape that isn't currently in the library are
/// left pending rather than attempted — the operator swaps tapes and runs
/// `continue` again, rather than this call blocking on (or failing) a load
/// of a tape nobody has inserted yet.
#[instrument(level = "info", skip(ctx), fields(job_id))]
pub async fn continue_job(
	ctx: &RestoreContext,
	job_id: RestoreJobId,
	cancel: &CancellationToken,
) -> Result<RestoreProgress> {
	let pending = ctx
		.catalog
		.restore_job_files(job_id, None, Some(false))
		.map_err(|err| miette!("{err}"))?;

	let tapes = ctx.catalog.all_tapes().map_err(|err| miette!("{err}"))?;
	let label_by_id: BTreeMap<TapeId, String> = tapes.into_iter().map(|t| (t.id, t.label)).collect();

	let inventory = ctx.tapelib.enumerate_tapes().await?;
	let available: std::collections::HashSet<String> = inventory
		.usable
		.into_iter()
		.chain(inventory.full)
		.collect();

	let mut by_tape: BTreeMap<TapeId, Vec<File>> = BTreeMap::new();
	for (_, file) in pending {
		let Some(tape_id) = file.tape_id else {
			warn!(file = file.id, "written file has no tape_id, skipping");
			continue;
		};
		let Some(label) = label_by_id.get(&tape_id) else {
			warn!(tape_id, "no catalog row for tape, skipping its files");
			continue;
		};
		if !available.contains(label) {
			continue;
		}
		by_tape.entry(tape_id).or_default().push(file);
	}

	let mut progress = RestoreProgress::default();

	for (tape_id, mut files) in by_tape {
		if cancel.is_cancelled() {
			info!("interrupted, stopping restore");
			break;
		}

		let label = &label_by_id[&tape_id];

		ctx.tapelib.load(label).await?;
		let generation = ctx.tapelib.current_lto_generation(label)?;
		if generation > 4 {
			ctx.tapelib.ensure_ltfs().await?;
			order_by_ltfs_position(ctx, &mut files);
		} else {
			files.sort_by_key(|f| f.tape_position.unwrap_or(0));
		}

		for file in &files {
			if cancel.is_cancelled() {
				break;
			}
			match restore_one(ctx, job_id, file).await {
				Ok(()) => progress.restored += 1,
				Err(err) => {
					warn!(file = file.id, %err, "restore failed for one file");
					progress.failures += 1;
				}
			}
		}

		ctx.tapelib.unload().await?;
	}

	if !cancel.is_cancelled() {
		let remaining = ctx.catalog.restore_job_stats(job_id).map_err(|err| miette!("{err}"))?;
		if remaining.count == 0 {
			ctx.catalog.finish_restore_job(job_id).map_err(|err| miette!("{err}"))?;
			info!(job_id, "restore job finished");
		} else {
			progress.remaining_by_tape = ctx
				.catalog
				.restore_job_remaining_by_tape(job_id)
				.map_err(|err| miette!("{err}"))?;
		}
	}

	Ok(progress)
}

/// Reorder `files` by their `ltfs.startblock` xattr on the mounted
/// filesystem, so the restore reads the tape roughly linearly instead of
/// seeking back and forth, the LTFS analogue of TAR's `tape_position`
/// ordering.
fn order_by_ltfs_position(ctx: &RestoreContext, files: &mut [File]) {
	files.sort_by_cached_key(|f| {
		f.filename_encrypted
			.as_deref()
			.map(|name| ctx.tapelib.mount_point().join(name))
			.and_then(|p| ltfs_start_block(p).ok())
			.unwrap_or(u64::MAX)
	});
}

async fn restore_one(ctx: &RestoreContext, job_id: RestoreJobId, file: &File) -> Result<()> {
	let opaque = file
		.filename_encrypted
		.as_deref()
		.ok_or_else(|| miette!("file {} has no encrypted name", file.id))?;
	let dest = ctx.dest_dir.join(&file.path);

	// Idempotent: a second `restore continue` after a crash shouldn't
	// re-decrypt a file that already landed on disk.
	if tokio::fs::metadata(&dest).await.is_ok() {
		ctx.catalog
			.mark_file_restored(job_id, file.id)
			.map_err(|err| miette!("{err}"))?;
		return Ok(());
	}

	let source = ctx.tapelib.mount_point().join(opaque);
	if let Some(parent) = dest.parent() {
		tokio::fs::create_dir_all(parent).await.into_diagnostic()?;
	}
	ctx.cipher
		.decrypt_file(&source, &dest)
		.await
		.wrap_err_with(|| format!("decrypting {opaque}"))?;

	ctx.catalog
		.mark_file_restored(job_id, file.id)
		.map_err(|err| miette!("{err}"))?;
	Ok(())
}

pub fn abort(catalog: &Catalog, job_id: RestoreJobId) -> Result<()> {
	catalog.delete_restore_job(job_id).map_err(|err| miette!("{err}"))
}

pub fn list(catalog: &Catalog) -> Result<Vec<RestoreJob>> {
	catalog.all_restore_jobs().map_err(|err| miette!("{err}"))
}

pub fn status(catalog: &Catalog, job_id: RestoreJobId) -> Result<RestoreJobStats> {
	catalog.restore_job_stats(job_id).map_err(|err| miette!("{err}"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		cipher::AgePassphraseCipher,
		tapelib::{fake::FakeTapeLibrary, TapeInventory},
	};
	use chrono::Utc;

	fn setup() -> (Arc<Catalog>, Arc<dyn TapeLibrary>, Arc<dyn CipherTool>) {
		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let tapelib: Arc<dyn TapeLibrary> = Arc::new(FakeTapeLibrary::new(
			PathBuf::from("/nonexistent-mount"),
			TapeInventory {
				usable: vec!["BARCODE01L5".to_owned()],
				full: vec![],
			},
			1024 * 1024 * 1024,
		));
		let cipher: Arc<dyn CipherTool> = Arc::new(AgePassphraseCipher::new(&"k".repeat(128)).unwrap());
		(catalog, tapelib, cipher)
	}

	#[test]
	fn start_rejects_empty_selection() {
		let (catalog, _, _) = setup();
		let err = start(&catalog, &["*".to_owned()], None);
		assert!(err.is_err());
	}

	#[test]
	fn start_selects_only_written_files() {
		let (catalog, _, _) = setup();
		let tape = catalog.get_or_create_tape("BARCODE01L5").unwrap();
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		catalog.claim_encrypted_name(id, "x.enc").unwrap();
		catalog.mark_encrypted(id, 10, "ch").unwrap();
		catalog.mark_written(id, tape.id, Some(0)).unwrap();

		let not_written = catalog.insert_file("b.bin", "b.bin").unwrap();
		catalog.mark_downloaded(not_written, 5, Utc::now(), "h2").unwrap();

		let job = start(&catalog, &["*".to_owned()], None).unwrap();
		let stats = status(&catalog, job).unwrap();
		assert_eq!(stats.count, 1);
	}

	#[tokio::test]
	async fn restore_continue_is_idempotent_when_file_already_present() {
		let (catalog, tapelib, cipher) = setup();
		let dir = tempfile::tempdir().unwrap();

		let tape = catalog.get_or_create_tape("BARCODE01L5").unwrap();
		let id = catalog.insert_file("a.bin", "a.bin").unwrap();
		catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
		catalog.claim_encrypted_name(id, "x.enc").unwrap();
		catalog.mark_encrypted(id, 10, "ch").unwrap();
		catalog.mark_written(id, tape.id, Some(0)).unwrap();

		tokio::fs::write(dir.path().join("a.bin"), b"already restored").await.unwrap();

		let ctx = RestoreContext {
			catalog: catalog.clone(),
			tapelib,
			cipher,
			dest_dir: dir.path().to_owned(),
		};
		let job = start(&catalog, &["*".to_owned()], None).unwrap();
		let progress = continue_job(&ctx, job, &CancellationToken::new()).await.unwrap();
		assert_eq!(progress.restored, 1);
		assert_eq!(progress.failures, 0);
	}

	/// Scenario 4: files are spread across tapes A, B and C, but only A and
	/// B are presently in the library. `continue_job` must restore A and
	/// B's files and leave C's pending without ever calling `load("C")` —
	/// on real hardware that load is a fatal `mtx` move onto a slot nobody
	/// put a tape in.
	#[tokio::test]
	async fn continue_job_defers_tapes_absent_from_the_library() {
		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let tapelib: Arc<dyn TapeLibrary> = Arc::new(FakeTapeLibrary::new(
			PathBuf::from("/nonexistent-mount"),
			TapeInventory {
				usable: vec!["BARCODE-A-L5".to_owned(), "BARCODE-B-L5".to_owned()],
				full: vec![],
			},
			1024 * 1024 * 1024,
		));
		let cipher: Arc<dyn CipherTool> = Arc::new(AgePassphraseCipher::new(&"k".repeat(128)).unwrap());
		let dir = tempfile::tempdir().unwrap();

		let tape_a = catalog.get_or_create_tape("BARCODE-A-L5").unwrap();
		let tape_b = catalog.get_or_create_tape("BARCODE-B-L5").unwrap();
		let tape_c = catalog.get_or_create_tape("BARCODE-C-L5").unwrap();

		for (name, tape) in [("a.bin", &tape_a), ("b.bin", &tape_b), ("c.bin", &tape_c)] {
			let id = catalog.insert_file(name, name).unwrap();
			catalog.mark_downloaded(id, 10, Utc::now(), "h").unwrap();
			catalog.claim_encrypted_name(id, &format!("{name}.enc")).unwrap();
			catalog.mark_encrypted(id, 10, "ch").unwrap();
			catalog.mark_written(id, tape.id, Some(0)).unwrap();
		}

		let ctx = RestoreContext {
			catalog: catalog.clone(),
			tapelib: tapelib.clone(),
			cipher,
			dest_dir: dir.path().to_owned(),
		};
		let job = start(&catalog, &["*".to_owned()], None).unwrap();
		let progress = continue_job(&ctx, job, &CancellationToken::new()).await.unwrap();

		assert_eq!(progress.restored, 2, "only A and B's files should have been restored");
		assert_eq!(progress.failures, 0);

		let stats = status(&catalog, job).unwrap();
		assert_eq!(stats.count, 1, "C's file must remain pending");

		assert_eq!(progress.remaining_by_tape.len(), 1);
		assert_eq!(progress.remaining_by_tape[0].0, "BARCODE-C-L5");
		assert_eq!(progress.remaining_by_tape[0].1, 1);

		assert!(
			tokio::fs::metadata(dir.path().join("c.bin")).await.is_err(),
			"tape C was never loaded, so its file cannot have been restored"
		);
	}
}

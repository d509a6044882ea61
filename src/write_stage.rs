//! Write Stage: plans tape occupancy, streams encrypted files to tape
//! (LTFS file-copy or TAR stream), verifies a sample, and seals the tape.
//!
//! `TapeFormat` is the tagged variant design note §9 prescribes; the two
//! concrete behaviors (LTFS vs TAR) share one driver ([`run`]) that
//! dispatches on it, rather than two independent stage implementations,
//! since the tape-selection/seal/anomaly handling is identical structure
//! for both.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};

use miette::{miette, Context as _, IntoDiagnostic as _, Result};
use rand::seq::SliceRandom as _;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::{
	catalog::{
		model::{File, FileId, TapeId},
		Catalog,
	},
	cipher::CipherTool,
	pathutil::SizeOrPercent,
	tapelib::TapeLibrary,
};

/// Files at or above this size are written as their own TAR chunk rather
/// than batched with neighbors.
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// LTO-4 logical block size.
pub const LTO4_BLOCK_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeFormat {
	Ltfs,
	Tar {
		block_size: u32,
		chunk_threshold: u64,
	},
}

impl TapeFormat {
	/// Pick a format from the barcode's LTO generation: LTO-4 and earlier
	/// get TAR, LTO-5+ get LTFS.
	pub fn for_lto_generation(generation: u8) -> Self {
		if generation <= 4 {
			Self::Tar {
				block_size: LTO4_BLOCK_SIZE,
				chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
			}
		} else {
			Self::Ltfs
		}
	}
}

/// How many of the prefix of `files` (already ordered oldest-ready-first)
/// fit into `available - keep_free`. Pure and side-effect free so it's
/// directly testable.
pub fn batch_target(files: &[File], available_bytes: u64, keep_free_bytes: u64) -> usize {
	let budget = available_bytes.saturating_sub(keep_free_bytes);
	let mut used = 0u64;
	let mut count = 0;
	for file in files {
		let size = file.filesize_encrypted.unwrap_or(0) as u64;
		if used.saturating_add(size) > budget {
			break;
		}
		used += size;
		count += 1;
	}
	count
}

/// Whether a single cipher file of `size` bytes fits given `free` bytes
/// and a `keep_free` reserve. A file exactly equal to `free - keep_free`
/// fits; anything larger declares the tape full.
pub fn fits_in_remaining_space(size: u64, free: u64, keep_free: u64) -> bool {
	size <= free.saturating_sub(keep_free)
}

/// Group files (in order) into TAR chunks: small files accumulate until a
/// file at or above `threshold` forces the pending chunk to flush and is
/// then written alone, after which accumulation restarts.
pub fn group_into_tar_chunks(files: &[(FileId, u64)], threshold: u64) -> Vec<Vec<FileId>> {
	let mut chunks = Vec::new();
	let mut current = Vec::new();
	for &(id, size) in files {
		if size >= threshold {
			if !current.is_empty() {
				chunks.push(std::mem::take(&mut current));
			}
			chunks.push(vec![id]);
		} else {
			current.push(id);
		}
	}
	if !current.is_empty() {
		chunks.push(current);
	}
	chunks
}

/// What a copy attempt onto an LTFS mount resulted in. A raw OS error 28
/// (`ENOSPC`) mid-copy is a drive anomaly, not an ordinary fatal failure
///: the controller reported free space that the drive
/// then refused to honor, which points at a hardware/media problem, not
/// an ordinary full-tape condition (which is caught earlier by
/// [`fits_in_remaining_space`]).
#[derive(Debug)]
pub enum CopyOutcome {
	Success,
	NoSpaceAnomaly,
	Fatal(std::io::Error),
}

pub fn classify_copy_error(err: std::io::Error) -> CopyOutcome {
	if err.raw_os_error() == Some(28) {
		CopyOutcome::NoSpaceAnomaly
	} else {
		CopyOutcome::Fatal(err)
	}
}

/// Shared context the Write stage driver threads through both formats.
pub struct WriteContext {
	pub catalog: Arc<Catalog>,
	pub tapelib: Arc<dyn TapeLibrary>,
	pub cipher: Arc<dyn CipherTool>,
	pub local_enc_dir: PathBuf,
	pub keep_free: SizeOrPercent,
	pub verify_files: SizeOrPercent,
}

/// Run the Write stage to completion: select a usable tape, write as much
/// of `files-ready-to-write` as fits, seal, and recurse to the next tape
/// while unwritten files and free tapes remain.
#[instrument(level = "info", skip_all)]
pub async fn run(ctx: &WriteContext, cancel: &CancellationToken) -> Result<()> {
	loop {
		if cancel.is_cancelled() {
			info!("interrupted, stopping write stage");
			return Ok(());
		}

		let ready = ctx
			.catalog
			.files_ready_to_write()
			.map_err(|err| miette!("{err}"))?;
		if ready.is_empty() {
			info!("no files ready to write");
			return Ok(());
		}

		let inventory = ctx.tapelib.enumerate_tapes().await?;
		let Some(label) = inventory.usable.first().cloned() else {
			return Err(miette!("no usable tape available in the library; evict full tapes"));
		};

		ctx.tapelib.load(&label).await?;
		let generation = ctx.tapelib.current_lto_generation(&label)?;
		let format = TapeFormat::for_lto_generation(generation);

		match format {
			TapeFormat::Ltfs => write_ltfs_tape(ctx, &label, &ready, cancel).await?,
			TapeFormat::Tar {
				block_size,
				chunk_threshold,
			} => write_tar_tape(ctx, &label, &ready, block_size, chunk_threshold, cancel).await?,
		}

		if cancel.is_cancelled() {
			return Ok(());
		}
	}
}

async fn write_ltfs_tape(
	ctx: &WriteContext,
	label: &str,
	ready: &[File],
	cancel: &CancellationToken,
) -> Result<()> {
	ctx.tapelib.ensure_ltfs().await?;
	let tape = ctx
		.catalog
		.get_or_create_tape(label)
		.map_err(|err| miette!("{err}"))?;

	let space = ctx.tapelib.space(LTO4_BLOCK_SIZE).await?;
	let keep_free = ctx.keep_free.resolve(space.total_bytes);
	let target = batch_target(ready, space.free_bytes, keep_free);

	let mut written_ids = Vec::new();
	let mut tape_full = target < ready.len();
	for file in &ready[..target] {
		if cancel.is_cancelled() {
			break;
		}
		let space = ctx.tapelib.space(LTO4_BLOCK_SIZE).await?;
		let size = file.filesize_encrypted.unwrap_or(0) as u64;

		if !fits_in_remaining_space(size, space.free_bytes, keep_free) {
			info!(tape = %label, "tape declared full by capacity check");
			tape_full = true;
			break;
		}

		let opaque = file
			.filename_encrypted
			.as_deref()
			.ok_or_else(|| miette!("file {} has no encrypted name", file.id))?;
		let src = ctx.local_enc_dir.join(opaque);
		let dest = ctx.tapelib.mount_point().join(opaque);

		match tokio::fs::copy(&src, &dest).await {
			Ok(_) => {
				ctx.catalog
					.mark_written(file.id, tape.id, None)
					.map_err(|err| miette!("{err}"))?;
				written_ids.push(file.id);
			}
			Err(err) => match classify_copy_error(err) {
				CopyOutcome::NoSpaceAnomaly => {
					error!(tape = %label, "no-space anomaly mid-copy, this tape is suspect");
					ctx.catalog
						.revert_written_by_tape(tape.id)
						.map_err(|err| miette!("{err}"))?;
					ctx.tapelib.format_ltfs().await?;
					return Err(miette!(
						"tape {label} reported ENOSPC with free space available; \
						 reformatted, manual investigation required"
					));
				}
				CopyOutcome::Fatal(err) => {
					return Err(miette!("copying to LTFS mount failed: {err}"));
				}
			},
		}
	}

	if tape_full {
		seal_tape(ctx, label, tape.id, TapeFormat::Ltfs, &written_ids).await?;
	} else if written_ids.is_empty() {
		return Err(miette!(
			"no file fit on tape {label} even though it is not yet full; check tape-keep-free"
		));
	}

	Ok(())
}

async fn write_tar_tape(
	ctx: &WriteContext,
	label: &str,
	ready: &[File],
	block_size: u32,
	chunk_threshold: u64,
	cancel: &CancellationToken,
) -> Result<()> {
	ctx.tapelib.set_scsi2logical_mode().await?;
	ctx.tapelib.set_blocksize(block_size).await?;

	let tape = ctx
		.catalog
		.get_or_create_tape(label)
		.map_err(|err| miette!("{err}"))?;

	let start_block = tape.end_of_data.unwrap_or(0) as u64;
	ctx.tapelib.seek(start_block).await?;

	let by_id: HashMap<FileId, &File> = ready.iter().map(|f| (f.id, f)).collect();
	let sized: Vec<(FileId, u64)> = ready
		.iter()
		.map(|f| (f.id, f.filesize_encrypted.unwrap_or(0) as u64))
		.collect();
	let chunks = group_into_tar_chunks(&sized, chunk_threshold);

	let mut written_ids = Vec::new();
	let mut tape_full = false;
	'chunks: for chunk in chunks {
		if cancel.is_cancelled() {
			break;
		}

		let space = ctx.tapelib.space(block_size).await?;
		let keep_free = ctx.keep_free.resolve(space.total_bytes);
		let chunk_size: u64 = chunk.iter().filter_map(|id| by_id.get(id)).map(|f| f.filesize_encrypted.unwrap_or(0) as u64).sum();

		if !fits_in_remaining_space(chunk_size, space.free_bytes, keep_free) {
			info!(tape = %label, "tape declared full by capacity check");
			tape_full = true;
			break 'chunks;
		}

		let pre_write_block = ctx.tapelib.current_block().await?;
		let names: Vec<String> = chunk
			.iter()
			.filter_map(|id| by_id.get(id))
			.filter_map(|f| f.filename_encrypted.clone())
			.collect();

		write_tar_chunk(&ctx.local_enc_dir, ctx.tapelib.tape_device(), &names)
			.await
			.wrap_err("writing TAR chunk to tape")?;

		let post_write_block = ctx.tapelib.current_block().await?;
		for id in &chunk {
			ctx.catalog
				.mark_written(*id, tape.id, Some(pre_write_block as i64))
				.map_err(|err| miette!("{err}"))?;
			written_ids.push(*id);
		}
		ctx.catalog
			.update_tape_end_of_data(tape.id, post_write_block as i64)
			.map_err(|err| miette!("{err}"))?;
	}

	if tape_full {
		seal_tape(
			ctx,
			label,
			tape.id,
			TapeFormat::Tar {
				block_size,
				chunk_threshold,
			},
			&written_ids,
		)
		.await?;
	} else if written_ids.is_empty() && !ready.is_empty() {
		return Err(miette!(
			"no chunk fit on tape {label} even though it is not yet full; check tape-keep-free"
		));
	}

	Ok(())
}

/// Invoke `tar` to stream `names` (read from `enc_dir`, where the
/// Encryption stage left the cipher files) as one archive written
/// straight to `device` at the drive's current tape position — there is
/// no mounted filesystem on a TAR/LTO-4 tape to copy into, unlike LTFS.
/// A dedicated function so tests can exercise the chunk-grouping logic
/// above without shelling out.
async fn write_tar_chunk(enc_dir: &Path, device: &str, names: &[String]) -> Result<()> {
	if names.is_empty() {
		return Ok(());
	}
	let enc_dir = enc_dir.to_owned();
	let device = device.to_owned();
	let names = names.to_vec();
	tokio::task::spawn_blocking(move || {
		duct::cmd("tar", {
			let mut args = vec!["-cf".to_owned(), device];
			args.push("-C".to_owned());
			args.push(enc_dir.to_string_lossy().into_owned());
			args.extend(names);
			args
		})
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("tar write failed")
	})
	.await
	.into_diagnostic()??;
	Ok(())
}

/// Stream a single named entry out of the TAR archive at `device` and
/// re-hash it, rather than materializing the whole archive — the
/// TAR-side analogue of reading one file back off an LTFS mount for
/// sample verification (spec §4.5 seal step 1, design note §9's
/// `verify_sample` capability).
fn read_tar_entry_hash(device: &str, name: &str) -> Result<String> {
	let reader = duct::cmd!("tar", "-xOf", device, name)
		.stderr_capture()
		.reader()
		.into_diagnostic()
		.wrap_err_with(|| format!("streaming {name} out of tar archive at {device}"))?;
	crate::hashing::hash_sync_reader(reader)
}

/// Tape-full sealing, shared by both write paths:
/// verify a random sample from the tape, write the encrypted catalog +
/// manifest, mark the tape full, drop the local cipher files, unload.
#[instrument(level = "info", skip(ctx, written_ids))]
async fn seal_tape(
	ctx: &WriteContext,
	label: &str,
	tape_id: TapeId,
	format: TapeFormat,
	written_ids: &[FileId],
) -> Result<()> {
	let files = ctx
		.catalog
		.files_on_tape(label)
		.map_err(|err| miette!("{err}"))?;
	if files.is_empty() {
		return Ok(());
	}

	let sample_count = match ctx.verify_files {
		SizeOrPercent::Absolute(n) => n as usize,
		SizeOrPercent::Percent(_) => ctx.verify_files.resolve(files.len() as u64) as usize,
	}
	.max(1)
	.min(files.len());

	let mut rng = rand::thread_rng();
	let mut sample: Vec<&File> = files.iter().collect();
	sample.shuffle(&mut rng);
	let mut sample: Vec<&File> = sample.into_iter().take(sample_count).collect();
	// TAR has no random access: order the sample by on-tape position so
	// verification seeks forward monotonically instead of thrashing the
	// head. LTFS is a mounted filesystem, so it needs no such ordering.
	if matches!(format, TapeFormat::Tar { .. }) {
		sample.sort_by_key(|f| f.tape_position.unwrap_or(0));
	}

	for file in &sample {
		let opaque = file
			.filename_encrypted
			.as_deref()
			.ok_or_else(|| miette!("sampled file {} has no encrypted name", file.id))?;
		let expected = file
			.hash_encrypted
			.as_deref()
			.ok_or_else(|| miette!("file {} has no recorded cipher hash", file.id))?;

		let actual = match format {
			TapeFormat::Ltfs => {
				let tape_path = ctx.tapelib.mount_point().join(opaque);
				crate::hashing::hash_file(&tape_path)
					.await
					.wrap_err("re-hashing sampled file from tape")?
			}
			TapeFormat::Tar { .. } => {
				let block = file
					.tape_position
					.ok_or_else(|| miette!("sampled file {} has no recorded tape position", file.id))?
					as u64;
				ctx.tapelib.seek(block).await?;
				let device = ctx.tapelib.tape_device().to_owned();
				let opaque = opaque.to_owned();
				tokio::task::spawn_blocking(move || read_tar_entry_hash(&device, &opaque))
					.await
					.into_diagnostic()?
					.wrap_err("re-hashing sampled file from tape")?
			}
		};

		if actual != expected {
			return Err(miette!(
				"verification failed for file {}: tape hash {actual} != catalog hash {expected}; refusing to seal {label}",
				file.id
			));
		}
		ctx.catalog.set_verified(file.id).map_err(|err| miette!("{err}"))?;
	}

	let epoch = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.into_diagnostic()?
		.as_secs();

	let db_name = format!("tapebackup_{epoch}.db.enc");
	let manifest_name = format!("tapebackup_{epoch}.txt.enc");
	let staging = ctx.local_enc_dir.join(format!(".seal-{epoch}"));
	tokio::fs::create_dir_all(&staging).await.into_diagnostic()?;

	let plain_db = staging.join("catalog.db");
	ctx.catalog.backup_to(&plain_db).map_err(|err| miette!("{err}"))?;
	let cipher_db = staging.join(&db_name);
	ctx.cipher.encrypt_file(&plain_db, &cipher_db).await?;

	let manifest_plain = staging.join("manifest.txt");
	let manifest_text = files
		.iter()
		.map(|f| format!("{};{};{}", f.id, f.path, f.filename_encrypted.as_deref().unwrap_or("")))
		.collect::<Vec<_>>()
		.join("\n");
	tokio::fs::write(&manifest_plain, manifest_text)
		.await
		.into_diagnostic()?;
	let cipher_manifest = staging.join(&manifest_name);
	ctx.cipher.encrypt_file(&manifest_plain, &cipher_manifest).await?;

	// Both the LTFS and TAR paths carry db.enc/manifest.txt.enc onto the
	// tape (design note / Open Question ii), but they land differently:
	// LTFS copies into the mounted filesystem like any other file, TAR has
	// no filesystem and gets one more chunk appended at the drive's
	// current position.
	match format {
		TapeFormat::Ltfs => {
			tokio::fs::copy(&cipher_db, ctx.tapelib.mount_point().join(&db_name))
				.await
				.into_diagnostic()
				.wrap_err("copying encrypted catalog backup to tape")?;
			tokio::fs::copy(&cipher_manifest, ctx.tapelib.mount_point().join(&manifest_name))
				.await
				.into_diagnostic()
				.wrap_err("copying encrypted manifest to tape")?;
		}
		TapeFormat::Tar { .. } => {
			let post_write_block;
			{
				let device = ctx.tapelib.tape_device();
				write_tar_chunk(&staging, device, &[db_name.clone(), manifest_name.clone()])
					.await
					.wrap_err("writing catalog backup + manifest chunk to tape")?;
				post_write_block = ctx.tapelib.current_block().await?;
			}
			ctx.catalog
				.update_tape_end_of_data(tape_id, post_write_block as i64)
				.map_err(|err| miette!("{err}"))?;
		}
	}

	tokio::fs::remove_dir_all(&staging).await.ok();

	ctx.catalog
		.mark_tape_full(label, chrono::Utc::now(), files.len() as i64)
		.map_err(|err| miette!("{err}"))?;
	ctx.catalog.set_tape_verified(label).map_err(|err| miette!("{err}"))?;

	for file in &files {
		if let Some(opaque) = &file.filename_encrypted {
			let _ = tokio::fs::remove_file(ctx.local_enc_dir.join(opaque)).await;
		}
	}

	ctx.tapelib.unload().await?;
	info!(tape = %label, files = files.len(), written = written_ids.len(), "tape sealed");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn file_with_size(id: FileId, size: i64) -> File {
		File {
			id,
			duplicate_of: None,
			filename: format!("f{id}"),
			path: format!("f{id}"),
			filename_encrypted: Some(format!("opaque{id}.enc")),
			mtime: None,
			filesize: Some(size),
			filesize_encrypted: Some(size),
			hash_plaintext: None,
			hash_encrypted: Some("hash".to_owned()),
			tape_id: None,
			downloaded_date: None,
			encrypted_date: None,
			written_date: None,
			tape_position: None,
			downloaded: true,
			encrypted: true,
			written: false,
			verified_count: 0,
			verified_last: None,
			deleted: false,
		}
	}

	#[test]
	fn batch_target_stops_at_budget() {
		let gib = 1024u64 * 1024 * 1024;
		let files: Vec<File> = (0..100).map(|i| file_with_size(i, 5 * gib as i64)).collect();
		// 100 files * 5 GiB = 500 GiB, capacity 512 GiB, keep-free 10G: budget 492 GiB -> 98 files fit
		let target = batch_target(&files, 502 * gib, 10 * gib);
		assert_eq!(target, 98);
	}

	#[test]
	fn file_exactly_matching_remaining_space_fits() {
		assert!(fits_in_remaining_space(90, 100, 10));
		assert!(!fits_in_remaining_space(91, 100, 10));
	}

	#[test]
	fn hundred_percent_keep_free_means_nothing_ever_written() {
		let gib = 1024u64 * 1024 * 1024;
		assert!(!fits_in_remaining_space(1, 512 * gib, 512 * gib));
	}

	#[test]
	fn tar_chunking_groups_small_files_and_isolates_large_ones() {
		let mib = 1024u64 * 1024;
		let files = vec![
			(1, 10 * mib),
			(2, 20 * mib),
			(3, 2 * 1024 * mib),
			(4, 100 * mib),
		];
		let chunks = group_into_tar_chunks(&files, DEFAULT_CHUNK_THRESHOLD);
		assert_eq!(chunks, vec![vec![1, 2], vec![3], vec![4]]);
	}

	#[test]
	fn classifies_enospc_as_anomaly() {
		let err = std::io::Error::from_raw_os_error(28);
		assert!(matches!(classify_copy_error(err), CopyOutcome::NoSpaceAnomaly));
	}

	#[test]
	fn classifies_other_errors_as_fatal() {
		let err = std::io::Error::from_raw_os_error(13);
		assert!(matches!(classify_copy_error(err), CopyOutcome::Fatal(_)));
	}

	#[test]
	fn format_dispatches_on_generation() {
		assert_eq!(TapeFormat::for_lto_generation(4), TapeFormat::Tar {
			block_size: LTO4_BLOCK_SIZE,
			chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
		});
		assert_eq!(TapeFormat::for_lto_generation(5), TapeFormat::Ltfs);
	}

	use crate::{
		catalog::Catalog,
		cipher::AgePassphraseCipher,
		tapelib::{fake::FakeTapeLibrary, TapeInventory},
	};
	use chrono::Utc;

	/// Drives `write_tar_tape` + `seal_tape` end to end against a plain
	/// file standing in for the tape device: two small files fit and get
	/// chunked/written, a third is too big for the remaining (static, in
	/// the fake) capacity and forces the tape full, which seals what was
	/// already written and re-verifies a sample by streaming it back out
	/// of the TAR archive on "device".
	#[tokio::test]
	async fn tar_write_and_seal_writes_then_verifies_from_the_device() {
		let dir = tempfile::tempdir().unwrap();
		let enc_dir = dir.path().join("enc");
		tokio::fs::create_dir_all(&enc_dir).await.unwrap();
		let device = dir.path().join("tape0.device");

		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let cipher: Arc<dyn CipherTool> = Arc::new(AgePassphraseCipher::new(&"k".repeat(128)).unwrap());

		// Two files small enough to fit the fake tape's static 1000-byte
		// capacity, one too big to fit alongside them.
		let mut small_ids = Vec::new();
		for (i, declared_size) in [(0, 100i64), (1, 100i64)] {
			let id = catalog.insert_file(&format!("f{i}.bin"), &format!("f{i}.bin")).unwrap();
			catalog.mark_downloaded(id, 5, Utc::now(), &format!("h{i}")).unwrap();
			let opaque = format!("opaque{i}.enc");
			catalog.claim_encrypted_name(id, &opaque).unwrap();

			let cipher_path = enc_dir.join(&opaque);
			tokio::fs::write(&cipher_path, format!("cipher bytes for file {i}")).await.unwrap();
			let real_hash = crate::hashing::hash_file(&cipher_path).await.unwrap();
			catalog.mark_encrypted(id, declared_size, &real_hash).unwrap();
			small_ids.push(id);
		}

		let big_id = catalog.insert_file("big.bin", "big.bin").unwrap();
		catalog.mark_downloaded(big_id, 5, Utc::now(), "hbig").unwrap();
		catalog.claim_encrypted_name(big_id, "opaquebig.enc").unwrap();
		catalog.mark_encrypted(big_id, 2000, "irrelevant-hash").unwrap();

		let ready = catalog.files_ready_to_write().unwrap();
		assert_eq!(ready.len(), 3);

		let tapelib: Arc<dyn TapeLibrary> = Arc::new(
			FakeTapeLibrary::new(
				dir.path().join("mount"),
				TapeInventory {
					usable: vec!["BARCODE01L4".to_owned()],
					full: vec![],
				},
				1000,
			)
			.with_tape_device(device.to_string_lossy().into_owned()),
		);

		let ctx = WriteContext {
			catalog: catalog.clone(),
			tapelib: tapelib.clone(),
			cipher: cipher.clone(),
			local_enc_dir: enc_dir.clone(),
			keep_free: SizeOrPercent::Absolute(0),
			verify_files: SizeOrPercent::Absolute(2),
		};
		let cancel = CancellationToken::new();

		// A chunk threshold below every declared size isolates each file
		// into its own TAR chunk, so the third (oversized) file's chunk is
		// evaluated, and rejected, on its own.
		write_tar_tape(&ctx, "BARCODE01L4", &ready, LTO4_BLOCK_SIZE, 50, &cancel)
			.await
			.unwrap();

		let tape = catalog.tape_by_label("BARCODE01L4").unwrap().unwrap();
		assert!(tape.full, "tape should have been sealed once the big file didn't fit");
		assert_eq!(tape.verified_count, 2);

		for id in small_ids {
			let file = catalog.file_by_id(id).unwrap().unwrap();
			assert!(file.written, "small file should have been written before sealing");
			assert_eq!(file.tape_id, Some(tape.id));
			assert!(file.verified_count >= 1, "sampled files must be re-verified at seal time");
		}

		let big = catalog.file_by_id(big_id).unwrap().unwrap();
		assert!(!big.written, "oversized file must not have been written to the sealed tape");

		assert_eq!(catalog.files_on_tape("BARCODE01L4").unwrap().len(), 2);
	}
}

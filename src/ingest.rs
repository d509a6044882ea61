//! Ingest Stage: enumerates the source tree, schedules parallel fetch
//! workers, hashes, deduplicates, and records file rows as `downloaded`.
//!
//! Worker pool: a bounded [`tokio::sync::Semaphore`] plus a
//! [`tokio::task::JoinSet`], per the redesign flag in design note §9
//! ("replace [thread pools with slot indices] with a bounded semaphore...
//! slot indices need only be preserved if logs reference them") — each
//! permit is tagged with a slot index purely for the tracing span.

use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use miette::{miette, Context as _, IntoDiagnostic as _, Result};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::{catalog::Catalog, hashing::hash_file, pathutil::relative_path};

/// One discovered source entry: a full path plus its size, used for the
/// capacity guard before any bytes move.
#[derive(Debug, Clone)]
pub struct SourceEntry {
	pub full_path: PathBuf,
	pub relative_path: String,
}

/// How the Ingest stage discovers candidate files: a local walk, a remote
/// `find` over SSH, or a pre-supplied list file — three transports
/// behind one trait.
#[async_trait]
pub trait SourceLister: Send + Sync {
	async fn list(&self) -> Result<Vec<SourceEntry>>;

	/// Fetch `entry` into the local staging directory and return its local
	/// path, if this lister operates in remote mode. Local-mode listers
	/// read files in place and should return the entry's own path.
	async fn fetch(&self, entry: &SourceEntry, staging_dir: &Path) -> Result<PathBuf>;

	fn is_local_mode(&self) -> bool;
}

/// Walks `base_dir` directly; ingest reads files in place, no staging
/// copy.
pub struct LocalLister {
	pub base_dir: PathBuf,
}

#[async_trait]
impl SourceLister for LocalLister {
	async fn list(&self) -> Result<Vec<SourceEntry>> {
		let base_dir = self.base_dir.clone();
		tokio::task::spawn_blocking(move || {
			let mut entries = Vec::new();
			for entry in WalkDir::new(&base_dir).into_iter().filter_map(|e| e.ok()) {
				if !entry.file_type().is_file() {
					continue;
				}
				let full_path = entry.path().to_owned();
				let relative_path = relative_path(&base_dir, &full_path)?;
				entries.push(SourceEntry {
					full_path,
					relative_path,
				});
			}
			Ok(entries)
		})
		.await
		.into_diagnostic()?
	}

	async fn fetch(&self, entry: &SourceEntry, _staging_dir: &Path) -> Result<PathBuf> {
		Ok(entry.full_path.clone())
	}

	fn is_local_mode(&self) -> bool {
		true
	}
}

/// Enumerates a remote host over SSH (`find`), fetches files via `scp`
/// into a staging directory, grounded on the original's SSH-based remote
/// transport (`original_source` config keys `remote-server`,
/// `remote-base-dir`, `remote-data-dir`).
pub struct RemoteLister {
	pub host: String,
	pub remote_base_dir: String,
	pub remote_data_dir: String,
}

#[async_trait]
impl SourceLister for RemoteLister {
	#[instrument(level = "debug", skip(self))]
	async fn list(&self) -> Result<Vec<SourceEntry>> {
		let host = self.host.clone();
		let remote_dir = self.remote_data_dir.clone();
		let base_dir = self.remote_base_dir.clone();
		let output = tokio::task::spawn_blocking(move || {
			duct::cmd!("ssh", &host, "find", &remote_dir, "-type", "f")
				.stderr_capture()
				.read()
				.map_err(|err| miette!("remote find over ssh failed: {err}"))
		})
		.await
		.into_diagnostic()??;

		output
			.lines()
			.map(|line| {
				let full_path = PathBuf::from(line);
				let relative_path = relative_path(&base_dir, &full_path)?;
				Ok(SourceEntry {
					full_path,
					relative_path,
				})
			})
			.collect()
	}

	async fn fetch(&self, entry: &SourceEntry, staging_dir: &Path) -> Result<PathBuf> {
		let dest = staging_dir.join(entry.full_path.file_name().unwrap_or_default());
		let host = self.host.clone();
		let remote_path = format!("{}:{}", host, entry.full_path.display());
		let dest_clone = dest.clone();
		tokio::task::spawn_blocking(move || {
			duct::cmd!("scp", "-q", &remote_path, &dest_clone)
				.stderr_capture()
				.run()
				.map_err(|err| miette!("fetching over scp failed: {err}"))
		})
		.await
		.into_diagnostic()??;
		Ok(dest)
	}

	fn is_local_mode(&self) -> bool {
		false
	}
}

/// Reads a pre-supplied list file, one path per line, remote mode.
pub struct FileListLister {
	pub list_path: PathBuf,
	pub remote_base_dir: String,
	pub host: String,
}

#[async_trait]
impl SourceLister for FileListLister {
	async fn list(&self) -> Result<Vec<SourceEntry>> {
		let contents = tokio::fs::read_to_string(&self.list_path)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("reading file list {}", self.list_path.display()))?;

		contents
			.lines()
			.map(str::trim)
			.filter(|l| !l.is_empty())
			.map(|line| {
				let full_path = PathBuf::from(line);
				let relative_path = relative_path(&self.remote_base_dir, &full_path)?;
				Ok(SourceEntry {
					full_path,
					relative_path,
				})
			})
			.collect()
	}

	async fn fetch(&self, entry: &SourceEntry, staging_dir: &Path) -> Result<PathBuf> {
		let dest = staging_dir.join(entry.full_path.file_name().unwrap_or_default());
		let host = self.host.clone();
		let remote_path = format!("{}:{}", host, entry.full_path.display());
		let dest_clone = dest.clone();
		tokio::task::spawn_blocking(move || {
			duct::cmd!("scp", "-q", &remote_path, &dest_clone)
				.stderr_capture()
				.run()
				.map_err(|err| miette!("fetching over scp failed: {err}"))
		})
		.await
		.into_diagnostic()??;
		Ok(dest)
	}

	fn is_local_mode(&self) -> bool {
		false
	}
}

pub struct IngestContext {
	pub catalog: Arc<Catalog>,
	pub lister: Arc<dyn SourceLister>,
	pub staging_dir: PathBuf,
	pub worker_count: usize,
	/// Combined bytes across `local-data-dir`, `local-enc-dir`,
	/// `local-verify-dir`, against which `max-storage-usage` is checked
	/// before each enqueue.
	pub current_storage_usage: Arc<dyn Fn() -> u64 + Send + Sync>,
	pub max_storage_usage_bytes: Option<u64>,
}

/// Run the Ingest stage to completion (one batch driver invocation).
#[instrument(level = "info", skip_all)]
pub async fn run(ctx: &IngestContext, cancel: &CancellationToken) -> Result<IngestSummary> {
	let entries = ctx.lister.list().await?;
	info!(count = entries.len(), "enumerated source tree");

	let semaphore = Arc::new(Semaphore::new(ctx.worker_count.max(1)));
	let mut tasks = JoinSet::new();
	let mut summary = IngestSummary::default();

	for (slot, entry) in entries.into_iter().enumerate() {
		if cancel.is_cancelled() {
			info!("interrupted, draining in-flight ingest workers");
			break;
		}

		if let Some(cap) = ctx.max_storage_usage_bytes {
			let usage = (ctx.current_storage_usage)();
			if usage > cap {
				warn!(usage, cap, "storage usage cap exceeded, stopping ingest");
				break;
			}
		}

		let permit = semaphore.clone().acquire_owned().await.into_diagnostic()?;
		let catalog = ctx.catalog.clone();
		let lister = ctx.lister.clone();
		let staging_dir = ctx.staging_dir.clone();

		tasks.spawn(async move {
			let _permit = permit;
			ingest_one(slot, &catalog, &*lister, &staging_dir, &entry).await
		});
	}

	while let Some(result) = tasks.join_next().await {
		match result.into_diagnostic()? {
			Ok(IngestOutcome::NewFile) => summary.new_files += 1,
			Ok(IngestOutcome::Duplicate) => summary.duplicates += 1,
			Ok(IngestOutcome::AlreadyKnown) => summary.already_known += 1,
			Err(err) => {
				warn!(%err, "ingest worker failed for one file");
				summary.failures += 1;
			}
		}
	}

	if !cancel.is_cancelled() {
		detect_deletions(ctx).await?;
	}

	Ok(summary)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
	pub new_files: usize,
	pub duplicates: usize,
	pub already_known: usize,
	pub failures: usize,
}

enum IngestOutcome {
	NewFile,
	Duplicate,
	AlreadyKnown,
}

#[instrument(level = "debug", skip(catalog, lister, staging_dir), fields(slot))]
async fn ingest_one(
	slot: usize,
	catalog: &Catalog,
	lister: &dyn SourceLister,
	staging_dir: &Path,
	entry: &SourceEntry,
) -> Result<IngestOutcome> {
	debug!(slot, path = %entry.relative_path, "worker picked up file");

	if catalog
		.file_by_relpath(&entry.relative_path)
		.map_err(|err| miette!("{err}"))?
		.is_some()
	{
		return Ok(IngestOutcome::AlreadyKnown);
	}

	let filename = entry
		.full_path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| entry.relative_path.clone());
	let row_id = catalog
		.insert_file(&filename, &entry.relative_path)
		.map_err(|err| miette!("{err}"))?;

	let local_path = lister.fetch(entry, staging_dir).await?;
	let hash = hash_file(&local_path).await?;
	let metadata = tokio::fs::metadata(&local_path).await.into_diagnostic()?;
	let mtime: chrono::DateTime<chrono::Utc> = metadata
		.modified()
		.into_diagnostic()?
		.into();

	let outcome = match catalog
		.file_by_plaintext_hash(&hash)
		.map_err(|err| miette!("{err}"))?
	{
		Some(primary) => {
			catalog
				.fold_into_duplicate(row_id, primary.id)
				.map_err(|err| miette!("{err}"))?;
			if !lister.is_local_mode() {
				let _ = tokio::fs::remove_file(&local_path).await;
			}
			IngestOutcome::Duplicate
		}
		None => {
			catalog
				.mark_downloaded(row_id, metadata.len() as i64, mtime, &hash)
				.map_err(|err| miette!("{err}"))?;
			IngestOutcome::NewFile
		}
	};

	Ok(outcome)
}

/// After a completed (non-interrupted) walk, flag any catalog row whose
/// path is under the configured data directory but didn't appear in this
/// walk as `deleted=true`.
async fn detect_deletions(ctx: &IngestContext) -> Result<()> {
	let seen: HashSet<String> = ctx
		.lister
		.list()
		.await?
		.into_iter()
		.map(|e| e.relative_path)
		.collect();

	let rows = ctx.catalog.not_deleted_files().map_err(|err| miette!("{err}"))?;
	for row in rows {
		if row.duplicate_of.is_none() && !seen.contains(&row.path) {
			ctx.catalog.mark_file_deleted(row.id).map_err(|err| miette!("{err}"))?;
			debug!(file = row.id, path = %row.path, "flagged deleted, missing from walk");
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::Catalog;

	#[tokio::test]
	async fn ingest_is_idempotent_on_a_stable_tree() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("a.bin"), b"hello").await.unwrap();

		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let lister: Arc<dyn SourceLister> = Arc::new(LocalLister {
			base_dir: dir.path().to_owned(),
		});
		let ctx = IngestContext {
			catalog: catalog.clone(),
			lister,
			staging_dir: dir.path().to_owned(),
			worker_count: 2,
			current_storage_usage: Arc::new(|| 0),
			max_storage_usage_bytes: None,
		};
		let cancel = CancellationToken::new();

		let first = run(&ctx, &cancel).await.unwrap();
		assert_eq!(first.new_files, 1);

		let second = run(&ctx, &cancel).await.unwrap();
		assert_eq!(second.new_files, 0);
		assert_eq!(second.already_known, 1);
	}

	#[tokio::test]
	async fn dedup_fold_keeps_one_primary_and_one_duplicate() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir_all(dir.path().join("a")).await.unwrap();
		tokio::fs::write(dir.path().join("a/x.bin"), b"identical").await.unwrap();
		tokio::fs::write(dir.path().join("a/y.bin"), b"identical").await.unwrap();

		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let lister: Arc<dyn SourceLister> = Arc::new(LocalLister {
			base_dir: dir.path().to_owned(),
		});
		let ctx = IngestContext {
			catalog: catalog.clone(),
			lister,
			staging_dir: dir.path().to_owned(),
			worker_count: 1,
			current_storage_usage: Arc::new(|| 0),
			max_storage_usage_bytes: None,
		};
		let cancel = CancellationToken::new();

		let summary = run(&ctx, &cancel).await.unwrap();
		assert_eq!(summary.new_files, 1);
		assert_eq!(summary.duplicates, 1);

		let duplicates = catalog.duplicates().unwrap();
		assert_eq!(duplicates.len(), 1);
		assert!(duplicates[0].filesize.is_none());
	}

	#[tokio::test]
	async fn max_storage_usage_zero_prevents_all_ingest() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("a.bin"), b"hello").await.unwrap();

		let catalog = Arc::new(Catalog::open_in_memory().unwrap());
		let lister: Arc<dyn SourceLister> = Arc::new(LocalLister {
			base_dir: dir.path().to_owned(),
		});
		let ctx = IngestContext {
			catalog: catalog.clone(),
			lister,
			staging_dir: dir.path().to_owned(),
			worker_count: 1,
			current_storage_usage: Arc::new(|| 1),
			max_storage_usage_bytes: Some(0),
		};
		let cancel = CancellationToken::new();

		let summary = run(&ctx, &cancel).await.unwrap();
		assert_eq!(summary.new_files, 0);
		assert_eq!(summary.duplicates, 0);
	}
}

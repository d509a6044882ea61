//! `get`: the Ingest stage CLI entry point.

use std::sync::Arc;

use clap::Parser;
use miette::Result;
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
	ingest::{FileListLister, IngestContext, LocalLister, RemoteLister, SourceLister},
	interrupt,
};

/// Ingest files from the configured source into the local staging area.
#[derive(Debug, Clone, Parser)]
pub struct GetArgs {
	/// Read the list of files to fetch from this path instead of walking
	/// the whole remote tree.
	#[arg(long = "filelist")]
	pub file_list: Option<std::path::PathBuf>,
}

pub async fn run(ctx: Context<GlobalArgs, GetArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let cancel = tokio_util::sync::CancellationToken::new();
	interrupt::install_handler(cancel.clone());

	let lister: Arc<dyn SourceLister> = if ctx.args_top.local {
		Arc::new(LocalLister {
			base_dir: app.config.local_data_dir.clone().into(),
		})
	} else if let Some(list_path) = ctx.args_sub.file_list {
		Arc::new(FileListLister {
			list_path,
			remote_base_dir: app
				.config
				.remote_base_dir
				.clone()
				.unwrap_or_else(|| app.config.local_data_dir.clone()),
			host: app
				.config
				.remote_server
				.clone()
				.ok_or_else(|| miette::miette!("remote-server is not configured"))?,
		})
	} else {
		Arc::new(RemoteLister {
			host: app
				.config
				.remote_server
				.clone()
				.ok_or_else(|| miette::miette!("remote-server is not configured"))?,
			remote_base_dir: app
				.config
				.remote_base_dir
				.clone()
				.unwrap_or_else(|| app.config.local_data_dir.clone()),
			remote_data_dir: app
				.config
				.remote_data_dir
				.clone()
				.unwrap_or_else(|| app.config.local_data_dir.clone()),
		})
	};

	let data_dir = std::path::PathBuf::from(&app.config.local_data_dir);

	// `-1` disables the cap outright; a percentage is
	// resolved against the total size of the filesystem backing
	// `local-data-dir`.
	let max_storage_usage_bytes = if crate::pathutil::is_unbounded_sentinel(&app.config.max_storage_usage) {
		None
	} else {
		match app.config.max_storage_usage()? {
			crate::pathutil::SizeOrPercent::Absolute(n) => Some(n),
			crate::pathutil::SizeOrPercent::Percent(p) => {
				let total = crate::pathutil::filesystem_total_bytes(&data_dir)?;
				Some(crate::pathutil::SizeOrPercent::Percent(p).resolve(total))
			}
		}
	};

	let usage_dirs = vec![
		data_dir.clone(),
		std::path::PathBuf::from(&app.config.local_enc_dir),
		std::path::PathBuf::from(&app.config.local_verify_dir),
	];
	let ingest_ctx = IngestContext {
		catalog: app.catalog.clone(),
		lister,
		staging_dir: data_dir,
		worker_count: app.config.threads.get,
		current_storage_usage: Arc::new(move || directories_size(&usage_dirs)),
		max_storage_usage_bytes,
	};

	let summary = crate::ingest::run(&ingest_ctx, &cancel).await?;
	info!(
		new = summary.new_files,
		duplicates = summary.duplicates,
		already_known = summary.already_known,
		failures = summary.failures,
		"ingest complete"
	);
	Ok(())
}

/// Combined size of `dirs`, re-walked on every capacity check (the
/// guard runs before each enqueue, not continuously) — cheap enough
/// given Ingest's own walk already touches most of these bytes.
fn directories_size(dirs: &[std::path::PathBuf]) -> u64 {
	dirs.iter()
		.flat_map(walkdir::WalkDir::new)
		.filter_map(|e| e.ok())
		.filter(|e| e.file_type().is_file())
		.filter_map(|e| e.metadata().ok())
		.map(|m| m.len())
		.sum()
}

//! `db repair`: recover from files stuck mid-download, mid-encrypt, or
//! missing their cipher on disk.

use clap::Parser;
use miette::Result;
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct RepairArgs {
	/// Delete every `files-ready-to-write` row with a missing cipher file
	/// without prompting.
	#[arg(long, conflicts_with = "no")]
	pub yes: bool,

	/// Keep every `files-ready-to-write` row with a missing cipher file
	/// without prompting.
	#[arg(long)]
	pub no: bool,
}

pub async fn run(ctx: Context<GlobalArgs, RepairArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let args = ctx.args_sub;

	let auto_delete = if args.yes {
		Some(true)
	} else if args.no {
		Some(false)
	} else {
		None
	};

	let summary = crate::repair::run(
		&app.catalog,
		std::path::Path::new(&app.config.local_enc_dir),
		auto_delete,
	)?;

	info!(
		broken_downloads_removed = summary.broken_downloads_removed,
		broken_encrypts_reset = summary.broken_encrypts_reset,
		missing_ciphers_deleted = summary.missing_ciphers_deleted,
		"repair complete"
	);
	Ok(())
}

//! `db backup`: copy the catalog into `database-backup-git-path`, timestamped
//!.

use chrono::Utc;
use clap::Parser;
use miette::{miette, IntoDiagnostic as _, Result};
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct BackupArgs {
	/// Write the backup here instead of the configured
	/// `database-backup-git-path`.
	#[arg(long)]
	pub to: Option<std::path::PathBuf>,
}

pub async fn run(ctx: Context<GlobalArgs, BackupArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let args = ctx.args_sub;

	let backup_dir = match args.to {
		Some(dir) => dir,
		None => std::path::PathBuf::from(
			app.config
				.database_backup_git_path
				.as_deref()
				.ok_or_else(|| miette!("database-backup-git-path is not configured; pass --to"))?,
		),
	};
	std::fs::create_dir_all(&backup_dir).into_diagnostic()?;

	let epoch = Utc::now().format("%Y%m%dT%H%M%SZ");
	let dest = backup_dir.join(format!("catalog-{epoch}.db"));
	app.catalog.backup_to(&dest).map_err(|err| miette!("{err}"))?;

	info!(path = %dest.display(), "catalog backed up");
	Ok(())
}

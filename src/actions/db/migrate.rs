//! `db migrate`: the one command allowed to run against an unversioned or
//! mismatched catalog. Bypasses [`App::load`] entirely —
//! it opens the catalog path straight off [`GlobalArgs`], since the whole
//! point is to run before the schema check would let anything else through.

use clap::Parser;
use miette::{miette, Result};
use tracing::info;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct MigrateArgs {}

pub async fn run(ctx: Context<GlobalArgs, MigrateArgs>) -> Result<()> {
	let config = ctx.args_top.load_config()?;
	let path = std::path::Path::new(&config.database);

	let summary = crate::migrate::migrate(path, chrono::Utc::now()).map_err(|err| miette!("{err}"))?;

	if summary.already_current {
		info!(database = %config.database, "catalog already at the current schema version");
		return Ok(());
	}

	info!(
		tapes_migrated = summary.tapes_migrated,
		files_migrated = summary.files_migrated,
		backup = ?summary.backup_path,
		"catalog migrated"
	);
	Ok(())
}

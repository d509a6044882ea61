use clap::Parser;
use miette::{miette, Result};
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

/// Discard a restore job and its file selection.
#[derive(Debug, Clone, Parser)]
pub struct AbortArgs {
	/// Restore job id; defaults to the most recently created job.
	pub job_id: Option<i64>,
}

pub async fn run(ctx: Context<GlobalArgs, AbortArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let job_id = match ctx.args_sub.job_id {
		Some(id) => id,
		None => app
			.catalog
			.restore_job_latest()
			.map_err(|err| miette!("{err}"))?
			.ok_or_else(|| miette!("no restore jobs exist"))?
			.id,
	};
	crate::restore_stage::abort(&app.catalog, job_id)?;
	info!(job_id, "restore job aborted");
	Ok(())
}

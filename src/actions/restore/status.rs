//! `restore status`: aggregate progress for one restore job.

use clap::Parser;
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct StatusArgs {
	/// Restore job id; defaults to the most recently created job.
	pub job_id: Option<i64>,
}

pub async fn run(ctx: Context<GlobalArgs, StatusArgs>) -> Result<()> {
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

	let remaining = crate::restore_stage::status(&app.catalog, job_id)?;
	let files = app
		.catalog
		.restore_job_files(job_id, None, None)
		.map_err(|err| miette!("{err}"))?;
	let total = files.len();
	let restored = files.iter().filter(|(map, _)| map.restored).count();

	println!(
		"job {job_id}: {restored}/{total} files restored, {remaining_count} remaining \
		 ({remaining_bytes} bytes across {tapes} tape(s))",
		remaining_count = remaining.count,
		remaining_bytes = remaining.total_size,
		tapes = remaining.distinct_tapes,
	);
	Ok(())
}

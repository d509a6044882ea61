use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
	interrupt,
	restore_stage::{RestoreContext, RestoreProgress},
};

/// Render the operator's cue for the next tape swap: one row per tape
/// still holding unrestored files, with how much of it is left.
pub(crate) fn print_remaining_tapes(progress: &RestoreProgress) {
	if progress.remaining_by_tape.is_empty() {
		return;
	}

	let mut table = Table::new();
	table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["tape", "files remaining", "bytes remaining"]);
	for (label, count, bytes) in &progress.remaining_by_tape {
		table.add_row(vec![label.clone(), count.to_string(), bytes.to_string()]);
	}

	println!("tapes still needed to finish this restore:");
	println!("{table}");
}

/// Resume (or begin executing) a restore job.
#[derive(Debug, Clone, Parser)]
pub struct ContinueArgs {
	/// Restore job id; defaults to the most recently created job.
	pub job_id: Option<i64>,
}

pub async fn run(ctx: Context<GlobalArgs, ContinueArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let cancel = tokio_util::sync::CancellationToken::new();
	interrupt::install_handler(cancel.clone());

	let job_id = match ctx.args_sub.job_id {
		Some(id) => id,
		None => app
			.catalog
			.restore_job_latest()
			.map_err(|err| miette!("{err}"))?
			.ok_or_else(|| miette!("no restore jobs exist; run `restore start` first"))?
			.id,
	};

	let restore_ctx = RestoreContext {
		catalog: app.catalog.clone(),
		tapelib: app.tapelib.clone(),
		cipher: app.cipher.clone(),
		dest_dir: app.config.restore_dir.clone().into(),
	};

	let progress = crate::restore_stage::continue_job(&restore_ctx, job_id, &cancel).await?;
	info!(
		job_id,
		restored = progress.restored,
		failures = progress.failures,
		"restore progress"
	);
	print_remaining_tapes(&progress);
	Ok(())
}

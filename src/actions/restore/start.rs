use clap::Parser;
use miette::Result;
use tracing::info;

use crate::{
	actions::{restore::continue_::print_remaining_tapes, Context},
	app::{App, GlobalArgs},
	interrupt,
	restore_stage::RestoreContext,
};

/// Select files by pattern (and optionally by tape) and plan a restore job.
#[derive(Debug, Clone, Parser)]
pub struct StartArgs {
	/// Glob pattern(s) to select files; defaults to everything written.
	#[arg(default_value = "*")]
	pub files: Vec<String>,

	/// Restrict the selection to this tape label.
	#[arg(short = 't', long)]
	pub tape: Option<String>,
}

/// Plans the job, then immediately runs one `continue` round against
/// whatever tapes are currently loaded, per spec §4.6.
pub async fn run(ctx: Context<GlobalArgs, StartArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let cancel = tokio_util::sync::CancellationToken::new();
	interrupt::install_handler(cancel.clone());

	let job_id = crate::restore_stage::start(&app.catalog, &ctx.args_sub.files, ctx.args_sub.tape.as_deref())?;

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
		"restore job planned and first round executed; run `restore continue {job_id}` for any remaining tapes"
	);
	print_remaining_tapes(&progress);
	Ok(())
}

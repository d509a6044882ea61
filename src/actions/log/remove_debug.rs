//! `log remove_debug`: strip `DEBUG`-level lines from every `*.log` file
//! in place, grounded on `functions/log.py`'s `remove_debug`.

use clap::Parser;
use miette::{IntoDiagnostic as _, Result};
use tracing::info;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct RemoveDebugArgs {
	/// Directory containing the `*.log` files to clean.
	#[arg(long, default_value = "logs")]
	pub dir: std::path::PathBuf,
}

pub async fn run(ctx: Context<GlobalArgs, RemoveDebugArgs>) -> Result<()> {
	let args = ctx.args_sub;

	let mut entries = tokio::fs::read_dir(&args.dir).await.into_diagnostic()?;
	let mut cleaned = 0;
	while let Some(entry) = entries.next_entry().await.into_diagnostic()? {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("log") {
			continue;
		}

		let contents = tokio::fs::read_to_string(&path).await.into_diagnostic()?;
		let filtered: String = contents
			.lines()
			.filter(|line| !line.contains("DEBUG"))
			.map(|line| format!("{line}\n"))
			.collect();
		tokio::fs::write(&path, filtered).await.into_diagnostic()?;
		info!(path = %path.display(), "removed debug entries");
		cleaned += 1;
	}

	info!(cleaned, dir = %args.dir.display(), "debug-line removal complete");
	Ok(())
}

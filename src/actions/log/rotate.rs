//! `log rotate`: move each `*.log` file in the log directory aside with a
//! timestamp suffix, the way a `logrotate`-style external tool would
//! (log rotation is an external collaborator; this keeps the on-disk
//! move but leaves compression to that tool, rather than vendoring a
//! compression crate the rest of the stack has no other use for).

use clap::Parser;
use miette::{IntoDiagnostic as _, Result};
use tracing::info;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct RotateArgs {
	/// Directory containing the `*.log` files to rotate.
	#[arg(long, default_value = "logs")]
	pub dir: std::path::PathBuf,
}

pub async fn run(ctx: Context<GlobalArgs, RotateArgs>) -> Result<()> {
	let args = ctx.args_sub;
	let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");

	let mut entries = tokio::fs::read_dir(&args.dir).await.into_diagnostic()?;
	let mut rotated = 0;
	while let Some(entry) = entries.next_entry().await.into_diagnostic()? {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("log") {
			continue;
		}
		let dest = path.with_extension(format!("log.{stamp}"));
		tokio::fs::rename(&path, &dest).await.into_diagnostic()?;
		info!(from = %path.display(), to = %dest.display(), "rotated log");
		rotated += 1;
	}

	info!(rotated, dir = %args.dir.display(), "log rotation complete");
	Ok(())
}

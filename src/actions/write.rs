//! `write`: the Write stage CLI entry point.

use clap::Parser;
use miette::Result;
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
	interrupt,
	write_stage::WriteContext,
};

/// Write every encrypted, unwritten file to tape, sealing tapes as they fill.
#[derive(Debug, Clone, Parser)]
pub struct WriteArgs {}

pub async fn run(ctx: Context<GlobalArgs, WriteArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let cancel = tokio_util::sync::CancellationToken::new();
	interrupt::install_handler(cancel.clone());

	let write_ctx = WriteContext {
		catalog: app.catalog.clone(),
		tapelib: app.tapelib.clone(),
		cipher: app.cipher.clone(),
		local_enc_dir: app.config.local_enc_dir.clone().into(),
		keep_free: app.config.tape_keep_free()?,
		verify_files: app.config.verify_files()?,
	};

	crate::write_stage::run(&write_ctx, &cancel).await?;
	info!("write stage complete");
	Ok(())
}

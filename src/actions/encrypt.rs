//! `encrypt`: the Encryption stage CLI entry point.

use clap::Parser;
use miette::Result;
use tracing::info;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
	encrypt_stage::EncryptContext,
	interrupt,
};

/// Encrypt every downloaded file not yet encrypted.
#[derive(Debug, Clone, Parser)]
pub struct EncryptArgs {}

pub async fn run(ctx: Context<GlobalArgs, EncryptArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let cancel = tokio_util::sync::CancellationToken::new();
	interrupt::install_handler(cancel.clone());

	let encrypt_ctx = EncryptContext {
		catalog: app.catalog.clone(),
		cipher: app.cipher.clone(),
		local_data_dir: app.config.local_data_dir.clone().into(),
		local_enc_dir: app.config.local_enc_dir.clone().into(),
		worker_count: app.config.threads.encrypt,
	};

	let summary = crate::encrypt_stage::run(&encrypt_ctx, &cancel).await?;
	info!(
		encrypted = summary.encrypted,
		failures = summary.failures,
		"encryption complete"
	);
	Ok(())
}

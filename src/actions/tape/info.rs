//! `tape info`: raw diagnostics from the changer and drive (`loaderinfo`,
//! `tapeinfo`, `mtx -f <dev> status`), surfaced verbatim.

use clap::Parser;
use miette::Result;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct InfoArgs {}

pub async fn run(ctx: Context<GlobalArgs, InfoArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;

	println!("-- loaderinfo --\n{}", app.tapelib.loaderinfo().await?);
	println!("-- tapeinfo --\n{}", app.tapelib.tapeinfo().await?);
	println!("-- mtx status --\n{}", app.tapelib.mtxinfo().await?);
	Ok(())
}

//! `restore list`: every restore job ever created, finished or not.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::Result;

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct ListArgs {}

pub async fn run(ctx: Context<GlobalArgs, ListArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let jobs = crate::restore_stage::list(&app.catalog)?;

	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(vec!["id", "started", "finished"]);
	for job in jobs {
		table.add_row(vec![
			job.id.to_string(),
			job.started.to_rfc3339(),
			job.finished.map(|f| f.to_rfc3339()).unwrap_or_else(|| "-".to_owned()),
		]);
	}
	println!("{table}");
	Ok(())
}

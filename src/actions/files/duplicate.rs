//! `files duplicate`: list every File row folded into a primary by
//! content-hash dedup.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct DuplicateArgs {}

pub async fn run(ctx: Context<GlobalArgs, DuplicateArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let duplicates = app.catalog.duplicates().map_err(|err| miette!("{err}"))?;

	if duplicates.is_empty() {
		println!("no duplicate files recorded");
		return Ok(());
	}

	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(vec!["id", "path", "duplicate of"]);
	for file in duplicates {
		table.add_row(vec![
			file.id.to_string(),
			file.path,
			file.duplicate_of.map(|id| id.to_string()).unwrap_or_default(),
		]);
	}
	println!("{table}");
	Ok(())
}

//! `tape status`: which labels the changer currently reports as usable vs
//! full, cross-referenced with the catalog's own view.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct StatusArgs {}

pub async fn run(ctx: Context<GlobalArgs, StatusArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;

	let inventory = app.tapelib.enumerate_tapes().await?;
	let tapes = app.catalog.all_tapes().map_err(|err| miette!("{err}"))?;

	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(vec!["label", "changer", "catalog full", "files", "last verified"]);

	for tape in &tapes {
		let changer = if inventory.usable.iter().any(|l| l == &tape.label) {
			"usable"
		} else if inventory.full.iter().any(|l| l == &tape.label) {
			"full"
		} else {
			"not in changer"
		};
		table.add_row(vec![
			tape.label.clone(),
			changer.to_owned(),
			tape.full.to_string(),
			tape.files_count.map(|n| n.to_string()).unwrap_or_default(),
			tape.verified_last.map(|t| t.to_rfc3339()).unwrap_or_default(),
		]);
	}

	for label in &inventory.usable {
		if !tapes.iter().any(|t| &t.label == label) {
			table.add_row(vec![label.clone(), "usable".to_owned(), "false".to_owned(), String::new(), String::new()]);
		}
	}

	println!("{table}");
	Ok(())
}

//! `db status`: the maintenance diagnostic — table names, row counts, and
//! per-column null counts, per-column type info.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct StatusArgs {
	/// Show per-column null counts and declared types for each table.
	#[arg(short = 'v', long)]
	pub verbose: bool,
}

pub async fn run(ctx: Context<GlobalArgs, StatusArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let args = ctx.args_sub;

	let version = app.catalog.schema_version().map_err(|err| miette!("{err}"))?;
	println!(
		"schema version: {}",
		version.map(|v| v.to_string()).unwrap_or_else(|| "none".to_owned())
	);

	let row_counts = app.catalog.row_counts().map_err(|err| miette!("{err}"))?;
	let mut tables: Vec<_> = row_counts.keys().cloned().collect();
	tables.sort();

	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(vec!["table", "rows"]);
	for name in &tables {
		table.add_row(vec![name.clone(), row_counts[name].to_string()]);
	}
	println!("{table}");

	if args.verbose {
		for name in &tables {
			let null_counts = app.catalog.null_counts(name).map_err(|err| miette!("{err}"))?;
			let column_types = app.catalog.column_types(name).map_err(|err| miette!("{err}"))?;

			let mut detail = Table::new();
			detail
				.load_preset(UTF8_FULL)
				.set_content_arrangement(ContentArrangement::Dynamic)
				.set_header(vec!["column", "type", "nulls"]);
			for (column, sql_type) in column_types {
				let nulls = null_counts.get(&column).copied().unwrap_or(0);
				detail.add_row(vec![column, sql_type, nulls.to_string()]);
			}
			println!("{name}:\n{detail}");
		}
	}

	Ok(())
}

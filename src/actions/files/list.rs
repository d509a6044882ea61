//! `files list`: show catalog rows matching glob patterns, optionally
//! narrowed to one tape.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct ListArgs {
	/// Glob pattern(s) to select files; defaults to everything.
	pub files: Vec<String>,

	/// Restrict to this tape label.
	#[arg(short = 't', long)]
	pub tape: Option<String>,

	/// Show every catalog column, not just the summary columns.
	#[arg(short = 'v', long)]
	pub verbose: bool,
}

pub async fn run(ctx: Context<GlobalArgs, ListArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let args = ctx.args_sub;

	let files = app
		.catalog
		.files_matching(&args.files, args.tape.as_deref(), None)
		.map_err(|err| miette!("{err}"))?;

	if files.is_empty() {
		println!("no files matched the given selection");
		return Ok(());
	}

	let mut table = Table::new();
	table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);

	if args.verbose {
		table.set_header(vec![
			"id", "path", "encrypted name", "tape", "downloaded", "encrypted", "written", "deleted",
		]);
		for file in files {
			table.add_row(vec![
				file.id.to_string(),
				file.path,
				file.filename_encrypted.unwrap_or_default(),
				file.tape_id.map(|t| t.to_string()).unwrap_or_default(),
				file.downloaded.to_string(),
				file.encrypted.to_string(),
				file.written.to_string(),
				file.deleted.to_string(),
			]);
		}
	} else {
		table.set_header(vec!["id", "path", "written"]);
		for file in files {
			table.add_row(vec![file.id.to_string(), file.path, file.written.to_string()]);
		}
	}

	println!("{table}");
	Ok(())
}

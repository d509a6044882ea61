//! `files summary`: aggregate counts and byte totals across every stage,
//! for a quick health check without paging through `files list`.

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use miette::{miette, Result};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
};

#[derive(Debug, Clone, Parser)]
pub struct SummaryArgs {}

pub async fn run(ctx: Context<GlobalArgs, SummaryArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let files = app.catalog.not_deleted_files().map_err(|err| miette!("{err}"))?;

	let total = files.len();
	let duplicates = files.iter().filter(|f| f.duplicate_of.is_some()).count();
	let downloaded = files.iter().filter(|f| f.downloaded).count();
	let encrypted = files.iter().filter(|f| f.encrypted).count();
	let written = files.iter().filter(|f| f.written).count();
	let plaintext_bytes: i64 = files.iter().filter_map(|f| f.filesize).sum();
	let cipher_bytes: i64 = files.iter().filter_map(|f| f.filesize_encrypted).sum();

	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(vec!["metric", "value"]);
	table.add_row(vec!["total files".to_owned(), total.to_string()]);
	table.add_row(vec!["duplicates".to_owned(), duplicates.to_string()]);
	table.add_row(vec!["downloaded".to_owned(), downloaded.to_string()]);
	table.add_row(vec!["encrypted".to_owned(), encrypted.to_string()]);
	table.add_row(vec!["written".to_owned(), written.to_string()]);
	table.add_row(vec!["plaintext bytes".to_owned(), plaintext_bytes.to_string()]);
	table.add_row(vec!["cipher bytes".to_owned(), cipher_bytes.to_string()]);
	println!("{table}");
	Ok(())
}

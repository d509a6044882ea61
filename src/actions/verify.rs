//! `verify`: on-demand re-verification of files already on tape, reusing
//! the Write stage's sampling hash-compare outside of a
//! seal. Out of scope beyond that sampling.

use std::collections::BTreeMap;

use clap::Parser;
use miette::{miette, Result};
use tracing::{info, warn};

use crate::{
	actions::Context,
	app::{App, GlobalArgs},
	catalog::model::TapeId,
};

#[derive(Debug, Clone, Parser)]
pub struct VerifyArgs {
	/// Glob pattern(s) to select files directly, instead of an entire tape.
	#[arg(long = "file")]
	pub file: Vec<String>,

	/// With `--file`, verify at most this many matches.
	#[arg(long)]
	pub count: Option<usize>,

	/// Verify every written file on this tape label.
	#[arg(long)]
	pub tape: Option<String>,
}

pub async fn run(ctx: Context<GlobalArgs, VerifyArgs>) -> Result<()> {
	let app = App::load(&ctx.args_top).await?;
	let args = ctx.args_sub;

	let files = if let Some(label) = &args.tape {
		app.catalog.files_on_tape(label).map_err(|err| miette!("{err}"))?
	} else {
		let matched = app
			.catalog
			.files_matching(&args.file, None, Some(true))
			.map_err(|err| miette!("{err}"))?;
		match args.count {
			Some(n) => matched.into_iter().take(n).collect(),
			None => matched,
		}
	};

	if files.is_empty() {
		return Err(miette!("no written files matched the given selection"));
	}

	let mut by_tape: BTreeMap<TapeId, Vec<_>> = BTreeMap::new();
	for file in files {
		if let Some(tape_id) = file.tape_id {
			by_tape.entry(tape_id).or_default().push(file);
		}
	}

	let tapes = app.catalog.all_tapes().map_err(|err| miette!("{err}"))?;
	let label_by_id: BTreeMap<TapeId, String> = tapes.into_iter().map(|t| (t.id, t.label)).collect();

	let mut verified = 0;
	let mut mismatched = 0;

	for (tape_id, group) in by_tape {
		let Some(label) = label_by_id.get(&tape_id) else {
			continue;
		};
		app.tapelib.load(label).await?;
		let generation = app.tapelib.current_lto_generation(label)?;
		if generation > 4 {
			app.tapelib.ensure_ltfs().await?;
		}

		for file in group {
			let Some(opaque) = &file.filename_encrypted else {
				continue;
			};
			let Some(expected) = &file.hash_encrypted else {
				continue;
			};
			let tape_path = app.tapelib.mount_point().join(opaque);
			let actual = crate::hashing::hash_file(&tape_path).await?;
			if &actual == expected {
				app.catalog.set_verified(file.id).map_err(|err| miette!("{err}"))?;
				verified += 1;
			} else {
				warn!(file = file.id, path = %file.path, "verification hash mismatch");
				mismatched += 1;
			}
		}

		app.tapelib.unload().await?;
	}

	info!(verified, mismatched, "verification complete");
	if mismatched > 0 {
		return Err(miette!("{mismatched} file(s) failed verification"));
	}
	Ok(())
}

//! `files`: read-only catalog inspection.

use clap::{Parser, Subcommand};
use miette::Result;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct FilesArgs {
	#[command(subcommand)]
	pub action: Action,
}

crate::subcommands! {
	[Context<GlobalArgs, FilesArgs> => {|ctx: Context<GlobalArgs, FilesArgs>| -> Result<(Action, Context<GlobalArgs>)> {
		Ok((ctx.args_sub.action.clone(), Context::new().with_top(ctx.args_top)))
	}}](with_sub)

	list => List(ListArgs),
	duplicate => Duplicate(DuplicateArgs),
	summary => Summary(SummaryArgs)
}

//! `restore`: plan and execute a restore job across however many tapes it
//! spans.

use clap::{Parser, Subcommand};
use miette::Result;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct RestoreArgs {
	#[command(subcommand)]
	pub action: Action,
}

crate::subcommands! {
	[Context<GlobalArgs, RestoreArgs> => {|ctx: Context<GlobalArgs, RestoreArgs>| -> Result<(Action, Context<GlobalArgs>)> {
		Ok((ctx.args_sub.action.clone(), Context::new().with_top(ctx.args_top)))
	}}](with_sub)

	start => Start(StartArgs),
	continue_ => Continue(ContinueArgs),
	abort => Abort(AbortArgs),
	list => List(ListArgs),
	status => Status(StatusArgs)
}

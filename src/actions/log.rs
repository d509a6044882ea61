//! `log`: housekeeping on the rolling `*.log` files lloggs writes, kept
//! here as a thin pass-through to the filesystem since log rotation
//! itself is an external collaborator, not core logic.

use clap::{Parser, Subcommand};
use miette::Result;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct LogArgs {
	#[command(subcommand)]
	pub action: Action,
}

crate::subcommands! {
	[Context<GlobalArgs, LogArgs> => {|ctx: Context<GlobalArgs, LogArgs>| -> Result<(Action, Context<GlobalArgs>)> {
		Ok((ctx.args_sub.action.clone(), Context::new().with_top(ctx.args_top)))
	}}](with_sub)

	rotate => Rotate(RotateArgs),
	remove_debug => RemoveDebug(RemoveDebugArgs)
}

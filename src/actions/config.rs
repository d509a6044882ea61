//! `config`: helpers around the configuration document itself, rather than
//! operations that consume it.

use clap::{Parser, Subcommand};
use miette::Result;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {
	#[command(subcommand)]
	pub action: Action,
}

crate::subcommands! {
	[Context<GlobalArgs, ConfigArgs> => {|ctx: Context<GlobalArgs, ConfigArgs>| -> Result<(Action, Context<GlobalArgs>)> {
		Ok((ctx.args_sub.action.clone(), Context::new().with_top(ctx.args_top)))
	}}](with_sub)

	create_key => CreateKey(CreateKeyArgs)
}

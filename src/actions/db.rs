//! `db`: catalog maintenance commands.

use clap::{Parser, Subcommand};
use miette::Result;

use crate::{actions::Context, app::GlobalArgs};

#[derive(Debug, Clone, Parser)]
pub struct DbArgs {
	#[command(subcommand)]
	pub action: Action,
}

crate::subcommands! {
	[Context<GlobalArgs, DbArgs> => {|ctx: Context<GlobalArgs, DbArgs>| -> Result<(Action, Context<GlobalArgs>)> {
		Ok((ctx.args_sub.action.clone(), Context::new().with_top(ctx.args_top)))
	}}](with_sub)

	repair => Repair(RepairArgs),
	backup => Backup(BackupArgs),
	status => Status(StatusArgs),
	migrate => Migrate(MigrateArgs)
}

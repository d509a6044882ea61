//! Top-level subcommand dispatch.
//!
//! `subcommands!` declares a module per subcommand, an `Action` enum of
//! their arg types, and an async `run` that matches the parsed action to
//! its module — used once here for the top-level surface and again
//! inside `restore`, `files`, `db`, `tape`, `config`, and `log` for their
//! own nested subcommands.

use clap::Subcommand;
use miette::Result;
use tracing::trace;

pub use context::Context;
pub mod context;

#[macro_export]
macro_rules! subcommands {
	(
		[$argtype:ty => $ctxcode:block]($ctxmethod:ident)
		$(
			$modname:ident => $enumname:ident($argname:ident)
		),+ $(,)?
	) => {
		$(
			pub mod $modname;
		)*

		#[derive(Debug, Clone, Subcommand)]
		pub enum Action {
			$(
				$enumname($modname::$argname),
			)*
		}

		pub async fn run(ctx: $argtype) -> Result<()> {
			let ctxfn = $ctxcode;
			match ctxfn(ctx)? {
				$(
					(Action::$enumname(args), ctx) => $modname::run(ctx.$ctxmethod(args)).await,
				)*
			}
		}
	};
}
#[allow(unused_imports)]
pub(crate) use subcommands;

use crate::{app::GlobalArgs, args::Args};

subcommands! {
	[Args => {|args: Args| -> Result<(Action, Context<GlobalArgs>)> {
		trace!(action = ?args.action, "dispatching top-level action");
		Ok((args.action, Context::new().with_top(args.globals)))
	}}](with_sub)

	get => Get(GetArgs),
	encrypt => Encrypt(EncryptArgs),
	write => Write(WriteArgs),
	verify => Verify(VerifyArgs),
	restore => Restore(RestoreArgs),
	files => Files(FilesArgs),
	db => Db(DbArgs),
	tape => Tape(TapeArgs),
	config => Config(ConfigArgs),
	log => Log(LogArgs)
}

//! `config create_key`: emit a 128-character random key from
//! `[A-Za-z0-9]`, suitable for the `enc-key` configuration value
//!. Needs no catalog or config file, so it bypasses
//! [`crate::app::App::load`] entirely.

use clap::Parser;
use miette::Result;

use crate::{actions::Context, app::GlobalArgs, pathutil::generate_key};

#[derive(Debug, Clone, Parser)]
pub struct CreateKeyArgs {}

pub async fn run(_ctx: Context<GlobalArgs, CreateKeyArgs>) -> Result<()> {
	println!("{}", generate_key());
	Ok(())
}

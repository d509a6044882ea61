//! Raw drive positioning for the LTO-4 / TAR path, via `mt` (the `mt-st`
//! package), for the LTO-4 auxiliary surface: `set-scsi2logical-mode`,
//! `set-blocksize`, `current-block`, `max-block`, `seek`.

use duct::cmd;
use miette::{miette, Context as _, IntoDiagnostic as _, Result};

pub fn set_scsi2logical_mode(device: &str) -> Result<()> {
	cmd!("mt", "-f", device, "stsetoptions", "scsi2logical")
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("setting SCSI-2 logical block addressing")?;
	Ok(())
}

pub fn set_blocksize(device: &str, bytes: u32) -> Result<()> {
	cmd!("mt", "-f", device, "setblk", bytes.to_string())
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("setting tape block size")?;
	Ok(())
}

pub fn seek(device: &str, block: u64) -> Result<()> {
	cmd!("mt", "-f", device, "seek", block.to_string())
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err_with(|| format!("seeking to block {block}"))?;
	Ok(())
}

/// Current logical block position, parsed from `mt tell`'s
/// `At block N` output.
pub fn current_block(device: &str) -> Result<u64> {
	let out = cmd!("mt", "-f", device, "tell")
		.stderr_capture()
		.read()
		.into_diagnostic()
		.wrap_err("reading current tape block")?;
	parse_block_number(&out)
}

fn parse_block_number(text: &str) -> Result<u64> {
	let digits: String = text
		.trim()
		.chars()
		.rev()
		.take_while(|c| c.is_ascii_digit())
		.collect::<String>()
		.chars()
		.rev()
		.collect();
	digits
		.parse()
		.map_err(|_| miette!("could not parse block number from mt output: {text:?}"))
}

/// Max addressable block on the loaded medium. `mt` has no single verb for
/// this; approximated by seeking to end-of-data and reading back the
/// position, as the original's capacity math (`(max - current) *
/// blocksize`) implies a one-shot read of remaining capacity rather than
/// a fixed constant per generation.
pub fn max_block(device: &str) -> Result<u64> {
	cmd!("mt", "-f", device, "eod")
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("seeking to end-of-data to determine max block")?;
	current_block(device)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_block_number_from_tell_output() {
		assert_eq!(parse_block_number("At block 123456.\n").unwrap(), 123456);
	}
}

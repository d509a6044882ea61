//! Media changer (`mtx`) wrapping, grounded on
//! `original_source/lib/tapelibrary.py`'s `get_tapes_tags_from_library`,
//! `get_current_tag_in_transfer_element`, `get_slot_by_tag`, `load_by_tag`,
//! and `unload`.

use duct::cmd;
use miette::{miette, Context as _, IntoDiagnostic as _, Result};

/// Run `mtx -f <device> status` and return its stdout as text.
pub fn status(device: &str) -> Result<String> {
	cmd!("mtx", "-f", device, "status")
		.stderr_capture()
		.read()
		.into_diagnostic()
		.wrap_err("running mtx status")
}

/// Volume tags reported in changer storage slots, in the order `mtx`
/// printed them. Ignores whatever tape is presently in the drive when
/// inventorying.
pub fn storage_slot_tags(status_text: &str) -> Vec<String> {
	status_text
		.lines()
		.map(str::trim)
		.filter(|line| line.starts_with("Storage Element") && line.contains("VolumeTag"))
		.filter_map(|line| extract_volume_tag(line))
		.collect()
}

fn extract_volume_tag(line: &str) -> Option<String> {
	let (_, rest) = line.split_once("VolumeTag")?;
	let rest = rest.trim_start().strip_prefix('=')?;
	Some(rest.trim().to_owned())
}

/// The tag currently in the drive ("Data Transfer Element"), or `None` if
/// the drive reports empty.
pub fn loaded_tag(status_text: &str) -> Option<String> {
	for line in status_text.lines().map(str::trim) {
		if line.contains("Data Transfer Element") {
			if line.contains("Empty") {
				return None;
			}
			if line.contains("Full") {
				return extract_volume_tag(line);
			}
		}
	}
	None
}

/// The storage slot number holding `tag`, parsed from a status dump line
/// like `Storage Element 12:Full :VolumeTag=BARCODE01L5`.
pub fn slot_for_tag(status_text: &str, tag: &str) -> Result<u32> {
	for line in status_text.lines().map(str::trim) {
		if line.contains(tag) && line.starts_with("Storage Element") {
			let after = line
				.strip_prefix("Storage Element ")
				.ok_or_else(|| miette!("unexpected mtx status line: {line:?}"))?;
			let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
			return digits
				.parse()
				.map_err(|_| miette!("could not parse slot number from {line:?}"));
		}
	}
	Err(miette!("tag {tag:?} not found in mtx status"))
}

pub fn load(device: &str, slot: u32) -> Result<()> {
	cmd!("mtx", "-f", device, "load", slot.to_string())
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("mtx load failed, giving up")?;
	Ok(())
}

pub fn unload(device: &str) -> Result<()> {
	cmd!("mtx", "-f", device, "unload")
		.stderr_capture()
		.run()
		.into_diagnostic()
		.wrap_err("mtx unload failed, giving up")?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE_STATUS: &str = "\
Storage Changer /dev/sg3:1 Drives, 24 Slots ( 1 Import/Export )
Data Transfer Element 0:Full (Storage Element 3 Loaded):VolumeTag = BARCODE03L5
Storage Element 1:Full :VolumeTag=BARCODE01L5
Storage Element 2:Full :VolumeTag=BARCODE02L4
Storage Element 3:Empty
";

	#[test]
	fn parses_storage_slot_tags() {
		let tags = storage_slot_tags(SAMPLE_STATUS);
		assert_eq!(tags, vec!["BARCODE01L5", "BARCODE02L4"]);
	}

	#[test]
	fn parses_loaded_tag() {
		assert_eq!(loaded_tag(SAMPLE_STATUS), Some("BARCODE03L5".to_owned()));
	}

	#[test]
	fn finds_slot_for_tag() {
		assert_eq!(slot_for_tag(SAMPLE_STATUS, "BARCODE02L4").unwrap(), 2);
	}
}

//! Path manipulation, human-readable size/percentage parsing, opaque name
//! generation, and tape start-block ordering via extended attributes.

use std::path::{Path, PathBuf};

use miette::{miette, Result};
use rand::{distributions::Alphanumeric, Rng};

/// Length of the random opaque name assigned to an encrypted file on tape,
/// before the `.enc` suffix.
pub const OPAQUE_NAME_LEN: usize = 64;

/// Length of a `config create_key` generated key.
pub const GENERATED_KEY_LEN: usize = 128;

/// Minimum accepted length for a configured `enc-key`.
pub const MIN_ENC_KEY_LEN: usize = 128;

fn random_alphanumeric(len: usize) -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(len)
		.map(char::from)
		.collect()
}

/// A random 64-character `[A-Za-z0-9]` name with a `.enc` suffix, used as a
/// file's opaque on-tape identity.
pub fn random_opaque_name() -> String {
	format!("{}.enc", random_alphanumeric(OPAQUE_NAME_LEN))
}

/// A 128-character random key, as emitted by `config create_key`.
pub fn generate_key() -> String {
	random_alphanumeric(GENERATED_KEY_LEN)
}

/// The path of `full` relative to `base`, using forward slashes
/// irrespective of platform, since relative paths are persisted in the
/// catalog and must compare stably across machines.
pub fn relative_path(base: impl AsRef<Path>, full: impl AsRef<Path>) -> Result<String> {
	let full = full.as_ref();
	let rel = full
		.strip_prefix(base.as_ref())
		.map_err(|_| miette!("{} is not inside {}", full.display(), base.as_ref().display()))?;
	Ok(rel.to_string_lossy().replace('\\', "/"))
}

pub fn join_relative(base: impl AsRef<Path>, relative: &str) -> PathBuf {
	base.as_ref().join(relative)
}

/// A value that is either an absolute quantity or a percentage of some
/// reference quantity, as config keys like `tape-keep-free` and
/// `verify-files` allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOrPercent {
	Absolute(u64),
	Percent(u8),
}

impl SizeOrPercent {
	/// Resolve against `reference` (e.g. total tape capacity, or a file
	/// count). Percentages are truncated, matching integer division.
	pub fn resolve(self, reference: u64) -> u64 {
		match self {
			Self::Absolute(n) => n,
			Self::Percent(p) => reference * u64::from(p) / 100,
		}
	}
}

/// Parse a human size: a bare integer (bytes), a byte-suffixed value
/// (`10G`, `512M`, `1K`, binary powers of 1024), or a percentage (`50%`).
///
/// Used for `tape-keep-free`, `verify-files`, and `max-storage-usage`.
pub fn parse_size_or_percent(raw: &str) -> Result<SizeOrPercent> {
	let raw = raw.trim();
	if let Some(pct) = raw.strip_suffix('%') {
		let pct: u8 = pct
			.trim()
			.parse()
			.map_err(|_| miette!("invalid percentage: {raw:?}"))?;
		return Ok(SizeOrPercent::Percent(pct));
	}

	if let Ok(n) = raw.parse::<u64>() {
		return Ok(SizeOrPercent::Absolute(n));
	}

	let (digits, multiplier) = match raw.chars().last() {
		Some(suffix @ ('K' | 'k' | 'M' | 'm' | 'G' | 'g' | 'T' | 't')) => {
			let mult = match suffix.to_ascii_uppercase() {
				'K' => 1024u64,
				'M' => 1024 * 1024,
				'G' => 1024 * 1024 * 1024,
				'T' => 1024 * 1024 * 1024 * 1024,
				_ => unreachable!(),
			};
			(&raw[..raw.len() - 1], mult)
		}
		_ => return Err(miette!("cannot parse size value: {raw:?}")),
	};

	let value: f64 = digits
		.trim()
		.parse()
		.map_err(|_| miette!("cannot parse size value: {raw:?}"))?;
	Ok(SizeOrPercent::Absolute((value * multiplier as f64) as u64))
}

/// The `-1` sentinel meaning "just check current usage, don't cap it"
///.
pub fn is_unbounded_sentinel(raw: &str) -> bool {
	raw.trim() == "-1"
}

/// Total size, in bytes, of the filesystem backing `path`, used to
/// resolve `max-storage-usage` when it's expressed as `N%` of disk
///.
#[cfg(unix)]
pub fn filesystem_total_bytes(path: impl AsRef<Path>) -> Result<u64> {
	use std::{ffi::CString, mem::MaybeUninit, os::unix::ffi::OsStrExt as _};

	let c_path = CString::new(path.as_ref().as_os_str().as_bytes())
		.map_err(|_| miette!("path {} contains a NUL byte", path.as_ref().display()))?;
	let mut stat = MaybeUninit::<libc::statvfs>::uninit();
	// SAFETY: `c_path` is a valid NUL-terminated C string and `stat` is
	// sized correctly for the FFI call; `statvfs` fully initializes it on
	// success.
	let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
	if rc != 0 {
		return Err(miette!(
			"statvfs failed for {}: {}",
			path.as_ref().display(),
			std::io::Error::last_os_error()
		));
	}
	// SAFETY: `statvfs` returned success, so `stat` is fully initialized.
	let stat = unsafe { stat.assume_init() };
	Ok(stat.f_blocks as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn filesystem_total_bytes(_path: impl AsRef<Path>) -> Result<u64> {
	Err(miette!("disk-space queries are only implemented on unix"))
}

/// Read the `ltfs.startblock` extended attribute of a path on a mounted
/// LTFS filesystem, falling back to the inode number when the attribute is
/// absent (e.g. non-LTFS filesystems used in tests), as the restore
/// and verify-sample orderings require.
pub fn ltfs_start_block(path: impl AsRef<Path>) -> Result<u64> {
	let path = path.as_ref();
	if let Ok(Some(raw)) = xattr::get(path, "ltfs.startblock") {
		if let Ok(s) = String::from_utf8(raw) {
			if let Ok(n) = s.trim().parse::<u64>() {
				return Ok(n);
			}
		}
	}

	#[cfg(unix)]
	{
		use std::os::unix::fs::MetadataExt;
		let meta = std::fs::metadata(path)
			.map_err(|err| miette!("reading metadata for {}: {err}", path.display()))?;
		Ok(meta.ino())
	}

	#[cfg(not(unix))]
	{
		Ok(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opaque_name_has_expected_shape() {
		let name = random_opaque_name();
		assert!(name.ends_with(".enc"));
		assert_eq!(name.len(), OPAQUE_NAME_LEN + 4);
		assert!(name[..OPAQUE_NAME_LEN].chars().all(|c| c.is_ascii_alphanumeric()));
	}

	#[test]
	fn generated_key_is_long_enough() {
		assert_eq!(generate_key().len(), GENERATED_KEY_LEN);
	}

	#[test]
	fn parses_plain_bytes() {
		assert_eq!(parse_size_or_percent("1024").unwrap(), SizeOrPercent::Absolute(1024));
	}

	#[test]
	fn parses_suffixed_sizes() {
		assert_eq!(
			parse_size_or_percent("10G").unwrap(),
			SizeOrPercent::Absolute(10 * 1024 * 1024 * 1024)
		);
	}

	#[test]
	fn parses_percent() {
		assert_eq!(parse_size_or_percent("100%").unwrap(), SizeOrPercent::Percent(100));
	}

	#[test]
	fn percent_resolves_against_reference() {
		assert_eq!(SizeOrPercent::Percent(100).resolve(512), 512);
		assert_eq!(SizeOrPercent::Percent(0).resolve(512), 0);
	}

	#[test]
	fn relative_path_strips_base() {
		let rel = relative_path("/data", "/data/a/x.bin").unwrap();
		assert_eq!(rel, "a/x.bin");
	}
}

//! LTFS mount/format wrapping, grounded on
//! `original_source/lib/tapelibrary.py`'s `ltfs`, `mkltfs`, `mount_ltfs`.

use std::path::Path;

use duct::cmd;
use miette::{miette, IntoDiagnostic as _, Result};

use super::{MountOutcome, TapeSpace};

const NEEDS_FORMAT_MARKER: &str = "Cannot read volume: medium is not partitioned";

/// Mount the tape currently in `drive` at `mountpoint`. Idempotent: if
/// already mounted, returns `Mounted` immediately without re-invoking
/// `ltfs`.
pub fn mount(mountpoint: &Path) -> Result<MountOutcome> {
	if is_mounted(mountpoint) {
		return Ok(MountOutcome::Mounted);
	}

	let output = cmd!("ltfs", mountpoint)
		.stdout_capture()
		.stderr_capture()
		.unchecked()
		.run()
		.into_diagnostic()?;

	if output.status.success() {
		return Ok(MountOutcome::Mounted);
	}

	let stderr = String::from_utf8_lossy(&output.stderr);
	if stderr.contains(NEEDS_FORMAT_MARKER) {
		return Ok(MountOutcome::NeedsFormat);
	}

	let accessible_marker = format!("Mountpoint {} specified but not accessible", mountpoint.display());
	if stderr.contains(&accessible_marker) {
		return Err(miette!(
			"tape drive mountpoint not found, please create folder: {}",
			mountpoint.display()
		));
	}

	Err(miette!("unknown error mounting LTFS: {stderr}"))
}

pub fn format(tapedrive: &str) -> Result<()> {
	cmd!("mkltfs", "-d", tapedrive)
		.stdout_capture()
		.stderr_capture()
		.run()
		.into_diagnostic()
		.map(|_| ())
}

pub(super) fn is_mounted(mountpoint: &Path) -> bool {
	// `/proc/mounts` is Linux-specific, matching the original's
	// `os.path.ismount` usage on the same platform.
	std::fs::read_to_string("/proc/mounts")
		.map(|mounts| {
			mounts
				.lines()
				.any(|line| line.split_whitespace().nth(1) == Some(mountpoint.to_string_lossy().as_ref()))
		})
		.unwrap_or(false)
}

/// Free/used/total space on the mounted LTFS filesystem via `statvfs`,
/// matching the original's `os.statvfs(local-tape-mount-dir)` capacity
/// check (`functions/tape.py`'s `free = st.f_bavail * st.f_frsize`, `used =
/// (st.f_blocks - st.f_bfree) * st.f_frsize`) — LTFS tapes are addressed as
/// a mounted filesystem, not by raw SCSI block position, so this deliberately
/// does not go through [`super::drive`]'s `mt`-based block math.
#[cfg(unix)]
pub fn space(mountpoint: &Path) -> Result<TapeSpace> {
	use std::{ffi::CString, mem::MaybeUninit, os::unix::ffi::OsStrExt as _};

	let c_path = CString::new(mountpoint.as_os_str().as_bytes())
		.map_err(|_| miette!("mount point {} contains a NUL byte", mountpoint.display()))?;
	let mut stat = MaybeUninit::<libc::statvfs>::uninit();
	// SAFETY: `c_path` is a valid NUL-terminated C string and `stat` is
	// sized correctly for the FFI call; `statvfs` fully initializes it on
	// success.
	let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
	if rc != 0 {
		return Err(miette!(
			"statvfs failed for LTFS mount {}: {}",
			mountpoint.display(),
			std::io::Error::last_os_error()
		));
	}
	// SAFETY: `statvfs` returned success, so `stat` is fully initialized.
	let stat = unsafe { stat.assume_init() };

	let total = stat.f_blocks * stat.f_frsize as u64;
	let free = stat.f_bavail * stat.f_frsize as u64;
	let used = (stat.f_blocks - stat.f_bfree) * stat.f_frsize as u64;
	Ok(TapeSpace {
		total_bytes: total,
		used_bytes: used,
		free_bytes: free,
	})
}

#[cfg(not(unix))]
pub fn space(_mountpoint: &Path) -> Result<TapeSpace> {
	Err(miette!("LTFS space queries are only implemented on unix"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unmounted_path_is_not_mounted() {
		let dir = tempfile::tempdir().unwrap();
		assert!(!is_mounted(dir.path()));
	}
}

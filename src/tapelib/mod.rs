//! The Tape Library Controller: wraps the media changer, the drive, and
//! the LTFS mount/format utility behind one [`TapeLibrary`] trait, so
//! tests substitute a fake implementation instead of driving real
//! hardware (design note §9).
//!
//! Grounded on `original_source/lib/tapelibrary.py`'s single `Tapelibrary`
//! class, which wraps `mtx`/`ltfs`/`mkltfs` subprocess calls; here it's
//! split across [`mtx`], [`ltfs`], and [`drive`] the way the Python
//! module's methods group by the external tool they shell out to.

mod controller;
mod drive;
mod ltfs;
mod mtx;

pub use controller::ProcessTapeLibrary;

use std::path::PathBuf;

use async_trait::async_trait;
use miette::Result;

/// Tapes visible to the changer, split by usability: usable (in
/// inventory, passes whitelist/blacklist policy, not yet catalog-`full`)
/// vs full (changer or catalog says so).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapeInventory {
	pub usable: Vec<String>,
	pub full: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
	Mounted,
	NeedsFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TapeSpace {
	pub total_bytes: u64,
	pub used_bytes: u64,
	pub free_bytes: u64,
}

/// The external-tool surface the Write, Restore, and `tape` CLI commands
/// depend on. One process owns the drive and robot at a time; there is no
/// intra-process contention to arbitrate.
#[async_trait]
pub trait TapeLibrary: Send + Sync {
	/// `(usable-labels, full-labels)`, ignoring whatever is presently
	/// loaded in the drive.
	async fn enumerate_tapes(&self) -> Result<TapeInventory>;

	/// If the drive holds a different label, unmount/unload first, then
	/// move the barcoded slot into the drive.
	async fn load(&self, label: &str) -> Result<()>;

	/// Unmount if mounted, then eject to slot.
	async fn unload(&self) -> Result<()>;

	/// Idempotent: returns `Mounted` if already (or now) mounted, or
	/// `NeedsFormat` if the medium needs `mkltfs` first.
	async fn mount_ltfs(&self) -> Result<MountOutcome>;

	/// Irreversible blank-format of the currently loaded tape.
	async fn format_ltfs(&self) -> Result<()>;

	/// Mount; on `NeedsFormat`, format then mount again.
	async fn ensure_ltfs(&self) -> Result<()>;

	/// Decode the LTO generation from the barcode suffix (`…L4`, `…L5`, …).
	fn current_lto_generation(&self, label: &str) -> Result<u8>;

	// ---- LTO-4 raw-drive auxiliary surface ----

	async fn set_scsi2logical_mode(&self) -> Result<()>;
	async fn set_blocksize(&self, bytes: u32) -> Result<()>;
	async fn current_block(&self) -> Result<u64>;
	async fn max_block(&self) -> Result<u64>;
	async fn seek(&self, block: u64) -> Result<()>;

	/// Free/used/total bytes remaining on the loaded medium. On a mounted
	/// LTFS tape this is read via `statvfs` on the mount point; on a bare
	/// LTO-4/TAR tape (no filesystem to statvfs) it's `(max - current) *
	/// blocksize` from the drive's own block position, using `blocksize`.
	async fn space(&self, blocksize: u32) -> Result<TapeSpace>;

	// ---- read-only diagnostics, backing `tape info` ----

	async fn loaderinfo(&self) -> Result<String>;
	async fn tapeinfo(&self) -> Result<String>;
	async fn mtxinfo(&self) -> Result<String>;

	fn mount_point(&self) -> &PathBuf;

	/// The raw drive device path. LTFS reads/writes go through
	/// `mount_point`, a filesystem; the TAR/LTO-4 path has no filesystem
	/// and streams `tar` straight at this device instead.
	fn tape_device(&self) -> &str;
}

/// Decode an LTO generation from a barcode's two-letter suffix
/// (`...L4`, `...L5`, `...L6`, ...), as `current-lto-generation` requires.
pub fn lto_generation_from_label(label: &str) -> Result<u8> {
	let upper = label.to_ascii_uppercase();
	let idx = upper
		.rfind('L')
		.ok_or_else(|| miette::miette!("barcode {label:?} has no LTO generation suffix"))?;
	upper[idx + 1..]
		.parse::<u8>()
		.map_err(|_| miette::miette!("barcode {label:?} has an unparsable LTO generation suffix"))
}

#[cfg(test)]
pub mod fake {
	use std::{
		path::PathBuf,
		sync::Mutex,
	};

	use super::*;

	/// An in-memory stand-in for hardware, used by Write/Restore stage
	/// tests.
	pub struct FakeTapeLibrary {
		pub mount_point: PathBuf,
		pub tape_device: String,
		pub inventory: TapeInventory,
		pub loaded: Mutex<Option<String>>,
		pub space: Mutex<TapeSpace>,
		pub needs_format: Mutex<bool>,
		pub current_block: Mutex<u64>,
		pub max_block: u64,
	}

	impl FakeTapeLibrary {
		pub fn new(mount_point: PathBuf, inventory: TapeInventory, total_bytes: u64) -> Self {
			Self {
				mount_point,
				tape_device: "/dev/null".to_owned(),
				inventory,
				loaded: Mutex::new(None),
				space: Mutex::new(TapeSpace {
					total_bytes,
					used_bytes: 0,
					free_bytes: total_bytes,
				}),
				needs_format: Mutex::new(false),
				current_block: Mutex::new(0),
				max_block: total_bytes / 65536,
			}
		}

		/// Point `tape_device` at a plain file instead of `/dev/null`, so
		/// tests exercising the TAR write/seal path can actually read back
		/// what was written.
		pub fn with_tape_device(mut self, device: impl Into<String>) -> Self {
			self.tape_device = device.into();
			self
		}

		/// Simulate consuming `bytes` of tape capacity, as the Write stage
		/// would after a successful copy.
		pub fn consume(&self, bytes: u64) {
			let mut space = self.space.lock().unwrap();
			space.used_bytes += bytes;
			space.free_bytes = space.free_bytes.saturating_sub(bytes);
		}
	}

	#[async_trait]
	impl TapeLibrary for FakeTapeLibrary {
		async fn enumerate_tapes(&self) -> Result<TapeInventory> {
			Ok(self.inventory.clone())
		}

		async fn load(&self, label: &str) -> Result<()> {
			*self.loaded.lock().unwrap() = Some(label.to_owned());
			Ok(())
		}

		async fn unload(&self) -> Result<()> {
			*self.loaded.lock().unwrap() = None;
			Ok(())
		}

		async fn mount_ltfs(&self) -> Result<MountOutcome> {
			if *self.needs_format.lock().unwrap() {
				Ok(MountOutcome::NeedsFormat)
			} else {
				Ok(MountOutcome::Mounted)
			}
		}

		async fn format_ltfs(&self) -> Result<()> {
			*self.needs_format.lock().unwrap() = false;
			Ok(())
		}

		async fn ensure_ltfs(&self) -> Result<()> {
			if self.mount_ltfs().await? == MountOutcome::NeedsFormat {
				self.format_ltfs().await?;
			}
			Ok(())
		}

		fn current_lto_generation(&self, label: &str) -> Result<u8> {
			lto_generation_from_label(label)
		}

		async fn set_scsi2logical_mode(&self) -> Result<()> {
			Ok(())
		}

		async fn set_blocksize(&self, _bytes: u32) -> Result<()> {
			Ok(())
		}

		async fn current_block(&self) -> Result<u64> {
			Ok(*self.current_block.lock().unwrap())
		}

		async fn max_block(&self) -> Result<u64> {
			Ok(self.max_block)
		}

		async fn seek(&self, block: u64) -> Result<()> {
			*self.current_block.lock().unwrap() = block;
			Ok(())
		}

		async fn space(&self, _blocksize: u32) -> Result<TapeSpace> {
			Ok(*self.space.lock().unwrap())
		}

		async fn loaderinfo(&self) -> Result<String> {
			Ok(String::new())
		}

		async fn tapeinfo(&self) -> Result<String> {
			Ok(String::new())
		}

		async fn mtxinfo(&self) -> Result<String> {
			Ok(String::new())
		}

		fn mount_point(&self) -> &PathBuf {
			&self.mount_point
		}

		fn tape_device(&self) -> &str {
			&self.tape_device
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_lto_generation_from_barcode_suffix() {
		assert_eq!(lto_generation_from_label("BARCODE01L5").unwrap(), 5);
		assert_eq!(lto_generation_from_label("BARCODE02L4").unwrap(), 4);
	}

	#[test]
	fn rejects_barcode_without_suffix() {
		assert!(lto_generation_from_label("BARCODE03").is_err());
	}
}

//! [`ProcessTapeLibrary`]: the real [`super::TapeLibrary`] implementation,
//! delegating to [`super::mtx`], [`super::ltfs`], and [`super::drive`].

use std::path::PathBuf;

use async_trait::async_trait;
use miette::Result;
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};

use super::{lto_generation_from_label, mtx, ltfs, drive, MountOutcome, TapeInventory, TapeLibrary, TapeSpace};

pub struct ProcessTapeLibrary {
	tapelib_device: String,
	tapedrive_device: String,
	mount_point: PathBuf,
	label_is_usable: Box<dyn Fn(&str) -> bool + Send + Sync>,
	label_is_catalog_full: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ProcessTapeLibrary {
	/// `label_is_usable` encodes the config whitelist/blacklist policy;
	/// `label_is_catalog_full` answers whether the catalog already marked
	/// this label `full`. Both are injected so this module stays free of a
	/// `Catalog`/`Config` dependency.
	pub fn new(
		tapelib_device: impl Into<String>,
		tapedrive_device: impl Into<String>,
		mount_point: impl Into<PathBuf>,
		label_is_usable: impl Fn(&str) -> bool + Send + Sync + 'static,
		label_is_catalog_full: impl Fn(&str) -> bool + Send + Sync + 'static,
	) -> Self {
		Self {
			tapelib_device: tapelib_device.into(),
			tapedrive_device: tapedrive_device.into(),
			mount_point: mount_point.into(),
			label_is_usable: Box::new(label_is_usable),
			label_is_catalog_full: Box::new(label_is_catalog_full),
		}
	}
}

#[async_trait]
impl TapeLibrary for ProcessTapeLibrary {
	#[instrument(level = "debug", skip(self))]
	async fn enumerate_tapes(&self) -> Result<TapeInventory> {
		let device = self.tapelib_device.clone();
		let status_text = spawn_blocking(move || mtx::status(&device)).await.unwrap()?;

		let mut inventory = TapeInventory::default();
		for label in mtx::storage_slot_tags(&status_text) {
			let catalog_full = (self.label_is_catalog_full)(&label);
			if catalog_full {
				inventory.full.push(label);
			} else if (self.label_is_usable)(&label) {
				inventory.usable.push(label);
			}
		}
		Ok(inventory)
	}

	#[instrument(level = "debug", skip(self))]
	async fn load(&self, label: &str) -> Result<()> {
		let device = self.tapelib_device.clone();
		let status_device = device.clone();
		let status_text = spawn_blocking(move || mtx::status(&status_device)).await.unwrap()?;
		let currently_loaded = mtx::loaded_tag(&status_text);

		if currently_loaded.as_deref() != Some(label) {
			if currently_loaded.is_some() {
				info!(%label, "wrong tape in drive, unloading first");
				self.unload().await?;
			}

			info!(%label, "loading tape into drive");
			let slot = mtx::slot_for_tag(&status_text, label)?;
			let label = label.to_owned();
			spawn_blocking(move || mtx::load(&device, slot)).await.unwrap()?;
		}
		Ok(())
	}

	#[instrument(level = "debug", skip(self))]
	async fn unload(&self) -> Result<()> {
		let mountpoint = self.mount_point.clone();
		if tokio::fs::metadata(&mountpoint).await.is_ok() {
			let _ = tokio::process::Command::new("umount")
				.arg(&mountpoint)
				.output()
				.await;
		}

		let device = self.tapelib_device.clone();
		spawn_blocking(move || mtx::unload(&device)).await.unwrap()?;
		info!("drive unloaded successfully");
		Ok(())
	}

	#[instrument(level = "debug", skip(self))]
	async fn mount_ltfs(&self) -> Result<MountOutcome> {
		let mountpoint = self.mount_point.clone();
		spawn_blocking(move || ltfs::mount(&mountpoint)).await.unwrap()
	}

	#[instrument(level = "debug", skip(self))]
	async fn format_ltfs(&self) -> Result<()> {
		warn!("formatting tape, this is irreversible");
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || ltfs::format(&device)).await.unwrap()
	}

	async fn ensure_ltfs(&self) -> Result<()> {
		if self.mount_ltfs().await? == MountOutcome::NeedsFormat {
			warn!("current tape needs mkltfs before mounting is possible");
			self.format_ltfs().await?;
			self.mount_ltfs().await?;
		}
		Ok(())
	}

	fn current_lto_generation(&self, label: &str) -> Result<u8> {
		lto_generation_from_label(label)
	}

	async fn set_scsi2logical_mode(&self) -> Result<()> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || drive::set_scsi2logical_mode(&device)).await.unwrap()
	}

	async fn set_blocksize(&self, bytes: u32) -> Result<()> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || drive::set_blocksize(&device, bytes)).await.unwrap()
	}

	async fn current_block(&self) -> Result<u64> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || drive::current_block(&device)).await.unwrap()
	}

	async fn max_block(&self) -> Result<u64> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || drive::max_block(&device)).await.unwrap()
	}

	async fn seek(&self, block: u64) -> Result<()> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || drive::seek(&device, block)).await.unwrap()
	}

	/// LTFS tapes report space via `statvfs` on the mounted filesystem
	/// (`ltfs::space`); a bare tape addressed through the raw TAR/LTO-4
	/// path has no filesystem to statvfs, so its free space is derived
	/// from the drive's own block position instead (`(max - current) *
	/// blocksize`). Checking mount state here, rather than taking a
	/// format flag, keeps this method correct regardless of which caller
	/// forgets to pass one.
	async fn space(&self, blocksize: u32) -> Result<TapeSpace> {
		if ltfs::is_mounted(&self.mount_point) {
			let mountpoint = self.mount_point.clone();
			return spawn_blocking(move || ltfs::space(&mountpoint)).await.unwrap();
		}

		let max = self.max_block().await?;
		let current = self.current_block().await?;
		let used = current * u64::from(blocksize);
		let total = max * u64::from(blocksize);
		Ok(TapeSpace {
			total_bytes: total,
			used_bytes: used,
			free_bytes: total.saturating_sub(used),
		})
	}

	async fn loaderinfo(&self) -> Result<String> {
		let device = self.tapelib_device.clone();
		spawn_blocking(move || {
			duct::cmd!("loaderinfo", "-f", &device)
				.stderr_capture()
				.read()
				.map_err(|err| miette::miette!("running loaderinfo: {err}"))
		})
		.await
		.unwrap()
	}

	async fn tapeinfo(&self) -> Result<String> {
		let device = self.tapedrive_device.clone();
		spawn_blocking(move || {
			duct::cmd!("tapeinfo", "-f", &device)
				.stderr_capture()
				.read()
				.map_err(|err| miette::miette!("running tapeinfo: {err}"))
		})
		.await
		.unwrap()
	}

	async fn mtxinfo(&self) -> Result<String> {
		let device = self.tapelib_device.clone();
		spawn_blocking(move || mtx::status(&device)).await.unwrap()
	}

	fn mount_point(&self) -> &PathBuf {
		&self.mount_point
	}

	fn tape_device(&self) -> &str {
		&self.tapedrive_device
	}
}

//! Wires a parsed [`GlobalArgs`] into the shared handles every action
//! needs: the loaded config, an open catalog, and the tape library /
//! cipher implementations backing them.

use std::{path::PathBuf, sync::Arc};

use miette::{miette, Result};
use tracing::debug;

use crate::{
	catalog::Catalog,
	cipher::{AgePassphraseCipher, CipherTool},
	config::Config,
	tapelib::{ProcessTapeLibrary, TapeLibrary},
};

#[derive(Debug, Clone, clap::Args)]
pub struct GlobalArgs {
	/// Use local-data-dir as the ingest source instead of the remote server.
	#[arg(long, global = true)]
	pub local: bool,

	/// Path to the JSON5 configuration document.
	#[arg(long, global = true, default_value = "tapebackup.json5")]
	pub config: PathBuf,

	/// Override the catalog database path.
	#[arg(short = 'D', long, global = true)]
	pub database: Option<PathBuf>,

	/// Override the remote server.
	#[arg(short = 's', long, global = true)]
	pub server: Option<String>,

	/// Override the local data directory.
	#[arg(short = 'd', long = "data-dir", global = true)]
	pub data_dir: Option<PathBuf>,

	/// Override the tape library (changer) device.
	#[arg(short = 'l', long = "tapelib", global = true)]
	pub tapelib: Option<String>,

	/// Override the tape drive device.
	#[arg(short = 't', long = "tapedrive", global = true)]
	pub tapedrive: Option<String>,

	/// Override the LTFS mount point.
	#[arg(short = 'm', long = "tape-mount", global = true)]
	pub tape_mount: Option<PathBuf>,
}

impl GlobalArgs {
	pub fn load_config(&self) -> Result<Config> {
		let mut config = Config::load(&self.config)?;
		if let Some(database) = &self.database {
			config.database = database.to_string_lossy().into_owned();
		}
		if let Some(server) = &self.server {
			config.remote_server = Some(server.clone());
		}
		if let Some(data_dir) = &self.data_dir {
			config.local_data_dir = data_dir.to_string_lossy().into_owned();
		}
		if let Some(tapelib) = &self.tapelib {
			config.devices.tapelib = tapelib.clone();
		}
		if let Some(tapedrive) = &self.tapedrive {
			config.devices.tapedrive = tapedrive.clone();
		}
		if let Some(tape_mount) = &self.tape_mount {
			config.local_tape_mount_dir = tape_mount.to_string_lossy().into_owned();
		}
		Ok(config)
	}
}

/// Shared handles a leaf action opens once from [`GlobalArgs`].
pub struct App {
	pub config: Config,
	pub catalog: Arc<Catalog>,
	pub tapelib: Arc<dyn TapeLibrary>,
	pub cipher: Arc<dyn CipherTool>,
}

impl App {
	pub async fn load(globals: &GlobalArgs) -> Result<Self> {
		let config = globals.load_config()?;
		Self::from_config(config).await
	}

	pub async fn from_config(config: Config) -> Result<Self> {
		let catalog = Arc::new(Catalog::open(&config.database).map_err(|err| miette!("{err}"))?);

		check_schema(&catalog)?;

		let cipher: Arc<dyn CipherTool> = Arc::new(AgePassphraseCipher::new(&config.enc_key)?);

		let whitelist = config.lto_whitelist.clone();
		let blacklist = config.lto_blacklist.clone();
		let whitelist_mode = config.is_whitelist_mode();
		let label_is_usable = move |label: &str| -> bool {
			if whitelist_mode {
				whitelist.iter().any(|l| l == label)
			} else {
				!blacklist.iter().any(|l| l == label)
			}
		};

		let full_catalog = catalog.clone();
		let label_is_catalog_full = move |label: &str| -> bool {
			full_catalog
				.tape_by_label(label)
				.ok()
				.flatten()
				.map(|t| t.full)
				.unwrap_or(false)
		};

		let tapelib: Arc<dyn TapeLibrary> = Arc::new(ProcessTapeLibrary::new(
			config.devices.tapelib.clone(),
			config.devices.tapedrive.clone(),
			PathBuf::from(&config.local_tape_mount_dir),
			label_is_usable,
			label_is_catalog_full,
		));

		debug!(database = %config.database, "application handles ready");

		Ok(Self {
			config,
			catalog,
			tapelib,
			cipher,
		})
	}
}

/// Refuse to run against a catalog whose schema is absent or mismatched,
/// except for the commands that exist specifically to fix that (`db
/// migrate`, `config create_key`) — those bypass [`App::load`] entirely
/// and open the catalog directly.
fn check_schema(catalog: &Catalog) -> Result<()> {
	match catalog.schema_version().map_err(|err| miette!("{err}"))? {
		None => Err(miette!(
			"catalog has no schema version; run `db migrate` before continuing"
		)),
		Some(v) if v != crate::catalog::EXPECTED_SCHEMA_VERSION => Err(miette!(
			"catalog schema version {v} does not match expected {}; run `db migrate`",
			crate::catalog::EXPECTED_SCHEMA_VERSION
		)),
		Some(_) => Ok(()),
	}
}

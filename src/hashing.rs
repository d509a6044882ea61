//! Content hashing used for deduplication and tape-side verification.

use std::path::Path;

use miette::{Context as _, IntoDiagnostic as _, Result};
use tokio::io::AsyncReadExt as _;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Hash whatever a synchronous [`std::io::Read`] yields, streamed in the
/// same fixed-size chunks as [`hash_file`]. Used to re-hash a single TAR
/// entry streamed straight out of a subprocess pipe, where there is no
/// plain file to open with [`hash_file`].
pub fn hash_sync_reader(mut reader: impl std::io::Read) -> Result<String> {
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	loop {
		let n = reader
			.read(&mut buf)
			.into_diagnostic()
			.wrap_err("reading stream for hashing")?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a file's full contents, streaming it in fixed-size chunks rather
/// than loading it whole — the files this tool moves around routinely
/// exceed available memory.
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
	let path = path.as_ref();
	let mut file = tokio::fs::File::open(path)
		.await
		.into_diagnostic()
		.wrap_err_with(|| format!("opening {} for hashing", path.display()))?;

	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	loop {
		let n = file
			.read(&mut buf)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("reading {} for hashing", path.display()))?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}

	Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn hash_is_stable_for_identical_content() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.bin");
		let b = dir.path().join("b.bin");
		tokio::fs::write(&a, b"identical bytes").await.unwrap();
		tokio::fs::write(&b, b"identical bytes").await.unwrap();

		assert_eq!(hash_file(&a).await.unwrap(), hash_file(&b).await.unwrap());
	}

	#[tokio::test]
	async fn hash_differs_for_different_content() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.bin");
		let b = dir.path().join("b.bin");
		tokio::fs::write(&a, b"hello").await.unwrap();
		tokio::fs::write(&b, b"world").await.unwrap();

		assert_ne!(hash_file(&a).await.unwrap(), hash_file(&b).await.unwrap());
	}

	#[tokio::test]
	async fn sync_reader_hash_matches_file_hash() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.bin");
		tokio::fs::write(&a, b"streamed out of a pipe instead of opened directly")
			.await
			.unwrap();

		let via_file = hash_file(&a).await.unwrap();
		let via_reader = hash_sync_reader(std::fs::File::open(&a).unwrap()).unwrap();
		assert_eq!(via_file, via_reader);
	}
}

//! Stream encryption behind an injected trait, keeping external-tool
//! dependencies as injected interfaces so tests can mock them. The
//! cipher is treated as an external black box — symmetric
//! authenticated-style encrypt/decrypt of a file given a key — and
//! here that's `age`'s scrypt-based passphrase recipient,
//! the same newtype shape as `actions/crypto/keys.rs::Passphrase`, but
//! built directly from the configured `enc-key` rather than prompted
//! interactively.

use std::{collections::HashSet, iter, path::Path, sync::Arc};

use age::secrecy::SecretString;
use age_core::format::{FileKey, Stanza};
use async_trait::async_trait;
use miette::{miette, Context as _, IntoDiagnostic as _, Result};
use tokio::io::AsyncWriteExt as _;
use tokio_util::compat::{
	FuturesAsyncReadCompatExt as _, FuturesAsyncWriteCompatExt as _, TokioAsyncReadCompatExt as _,
	TokioAsyncWriteCompatExt as _,
};
use tracing::{instrument, trace};

use crate::pathutil::MIN_ENC_KEY_LEN;

/// A scrypt-derived age key pair, built from a single shared passphrase.
/// Implements both [`age::Recipient`] and [`age::Identity`] by delegating
/// to the corresponding `age::scrypt` type.
#[derive(Clone)]
struct SharedKey {
	recipient: age::scrypt::Recipient,
	identity: age::scrypt::Identity,
}

impl SharedKey {
	fn new(secret: SecretString) -> Self {
		Self {
			recipient: age::scrypt::Recipient::new(secret.clone()),
			identity: age::scrypt::Identity::new(secret),
		}
	}
}

impl age::Recipient for SharedKey {
	fn wrap_file_key(
		&self,
		file_key: &FileKey,
	) -> std::result::Result<(Vec<Stanza>, HashSet<String>), age::EncryptError> {
		self.recipient.wrap_file_key(file_key)
	}
}

impl age::Identity for SharedKey {
	fn unwrap_stanza(
		&self,
		stanza: &Stanza,
	) -> Option<std::result::Result<FileKey, age::DecryptError>> {
		self.identity.unwrap_stanza(stanza)
	}

	fn unwrap_stanzas(
		&self,
		stanzas: &[Stanza],
	) -> Option<std::result::Result<FileKey, age::DecryptError>> {
		self.identity.unwrap_stanzas(stanzas)
	}
}

/// The interface the Encryption and Restore stages depend on, so tests can
/// substitute a fake cipher instead of running real `age` crypto.
#[async_trait]
pub trait CipherTool: Send + Sync {
	async fn encrypt_file(&self, plaintext: &Path, ciphertext: &Path) -> Result<u64>;
	async fn decrypt_file(&self, ciphertext: &Path, plaintext: &Path) -> Result<u64>;
}

/// The real cipher: `age` with a scrypt-derived passphrase key, streamed
/// through the same async copy loop as `actions/crypto/streams.rs`.
pub struct AgePassphraseCipher {
	key: Arc<SharedKey>,
}

impl AgePassphraseCipher {
	/// `secret` is the configured `enc-key`, required to be at least 128
	/// bytes.
	pub fn new(secret: &str) -> Result<Self> {
		if secret.len() < MIN_ENC_KEY_LEN {
			return Err(miette!(
				"enc-key must be at least {MIN_ENC_KEY_LEN} bytes, got {}",
				secret.len()
			));
		}
		Ok(Self {
			key: Arc::new(SharedKey::new(SecretString::from(secret.to_owned()))),
		})
	}
}

#[async_trait]
impl CipherTool for AgePassphraseCipher {
	#[instrument(level = "debug", skip(self))]
	async fn encrypt_file(&self, plaintext: &Path, ciphertext: &Path) -> Result<u64> {
		let input = tokio::fs::File::open(plaintext)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("opening {} for encryption", plaintext.display()))?;
		let output = tokio::fs::File::create(ciphertext)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("creating {}", ciphertext.display()))?;

		let key = (*self.key).clone();
		let mut encryptor = age::Encryptor::with_recipients(iter::once(&key as &dyn age::Recipient))
			.expect("BUG: a single recipient is always given")
			.wrap_async_output(output.compat_write())
			.await
			.into_diagnostic()?
			.compat_write();

		let mut reader = input;
		let bytes = tokio::io::copy(&mut reader, &mut encryptor)
			.await
			.into_diagnostic()
			.wrap_err("encrypting file")?;

		encryptor
			.shutdown()
			.await
			.into_diagnostic()
			.wrap_err("closing encrypted output")?;

		trace!(bytes, "file encrypted");
		Ok(bytes)
	}

	#[instrument(level = "debug", skip(self))]
	async fn decrypt_file(&self, ciphertext: &Path, plaintext: &Path) -> Result<u64> {
		let input = tokio::fs::File::open(ciphertext)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("opening {} for decryption", ciphertext.display()))?;
		if let Some(parent) = plaintext.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.into_diagnostic()
				.wrap_err_with(|| format!("creating {}", parent.display()))?;
		}
		let mut output = tokio::fs::File::create(plaintext)
			.await
			.into_diagnostic()
			.wrap_err_with(|| format!("creating {}", plaintext.display()))?;

		let key = (*self.key).clone();
		let mut decryptor = age::Decryptor::new_async(input.compat())
			.await
			.into_diagnostic()?
			.decrypt_async(iter::once(&key as &dyn age::Identity))
			.into_diagnostic()?
			.compat();

		let bytes = tokio::io::copy(&mut decryptor, &mut output)
			.await
			.into_diagnostic()
			.wrap_err("decrypting file")?;

		output
			.shutdown()
			.await
			.into_diagnostic()
			.wrap_err("closing decrypted output")?;

		trace!(bytes, "file decrypted");
		Ok(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_key() -> String {
		"x".repeat(MIN_ENC_KEY_LEN)
	}

	#[tokio::test]
	async fn encrypt_then_decrypt_is_bitwise_identity() {
		let cipher = AgePassphraseCipher::new(&test_key()).unwrap();
		let dir = tempfile::tempdir().unwrap();
		let plain = dir.path().join("plain.bin");
		let enc = dir.path().join("opaque.enc");
		let restored = dir.path().join("restored.bin");

		tokio::fs::write(&plain, b"some file contents, long enough to matter")
			.await
			.unwrap();

		cipher.encrypt_file(&plain, &enc).await.unwrap();
		cipher.decrypt_file(&enc, &restored).await.unwrap();

		let original = tokio::fs::read(&plain).await.unwrap();
		let round_tripped = tokio::fs::read(&restored).await.unwrap();
		assert_eq!(original, round_tripped);
	}

	#[test]
	fn rejects_short_keys() {
		assert!(AgePassphraseCipher::new("too-short").is_err());
	}
}

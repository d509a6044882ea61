//! Cooperative cancellation.
//!
//! Per design note §9, there is no ambient global interrupt flag; a
//! [`tokio_util::sync::CancellationToken`] is created once in `main` and
//! threaded explicitly into every stage driver and worker task. A second
//! Ctrl-C escalates: the first cancels the token (workers drain), the
//! second exits the process immediately.

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Install a Ctrl-C handler that cancels `token` on the first signal and
/// aborts the process on the second.
pub fn install_handler(token: CancellationToken) {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_err() {
			return;
		}
		warn!("interrupt received, draining in-flight work (press Ctrl-C again to force-quit)");
		token.cancel();

		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("second interrupt received, exiting immediately");
			std::process::exit(130);
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_starts_uncancelled() {
		let token = CancellationToken::new();
		assert!(!token.is_cancelled());
	}
}

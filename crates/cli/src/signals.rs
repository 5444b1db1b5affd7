//! SIGTERM/SIGHUP → cancellation-token wiring: both signals set the
//! token, as does deadline expiration. `nix::sys::signal`'s C handler
//! can't capture state, so the token to cancel is stashed in a
//! process-wide `OnceCell` the handler reads.

use gpexpand_concurrency::CancellationToken;
use nix::sys::signal::{self, SigHandler, Signal};
use once_cell::sync::OnceCell;

static ACTIVE_TOKEN: OnceCell<CancellationToken> = OnceCell::new();

extern "C" fn handle_signal(_signum: i32) {
    if let Some(token) = ACTIVE_TOKEN.get() {
        token.cancel();
    }
}

/// Installs SIGTERM and SIGHUP handlers that cancel `token`. Must be
/// called at most once per process; a second call is a silent no-op
/// (the first-installed token remains authoritative).
pub fn install(token: CancellationToken) {
    if ACTIVE_TOKEN.set(token).is_err() {
        return;
    }
    unsafe {
        let _ = signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_signal));
        let _ = signal::signal(Signal::SIGHUP, SigHandler::Handler(handle_signal));
    }
}

//! Cooperative cancellation of the acquisition loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(unix)]
use std::sync::OnceLock;

#[cfg(unix)]
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        Default::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token when the process receives SIGINT, SIGTERM or SIGABRT.
    ///
    /// Only one token per process can be bound to signals.
    #[cfg(unix)]
    pub fn cancel_on_signals(&self) -> Result<()> {
        SIGNAL_TOKEN.set(self.clone())
            .map_err(|_| Error::Other("signal handlers already installed".to_owned()))?;
        for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGABRT] {
            // SAFETY: The handler only performs an atomic store, which is async-signal-safe.
            // SA_RESTART is left clear so that a blocked read fails with EINTR.
            let result = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(signal, &action, std::ptr::null_mut())
            };
            if result == -1 {
                return Err(Error::Other(format!(
                    "cannot install handler for signal {}: {}", signal, std::io::Error::last_os_error())))
            }
            log::debug!("cancel_on_signals: installed handler for signal {}", signal);
        }
        Ok(())
    }
}

#[cfg(unix)]
static SIGNAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.cancel()
    }
}

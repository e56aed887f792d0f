//! Process termination flag raised from signal delivery.

use std::sync::{
    atomic::{AtomicBool, AtomicI32, Ordering},
    Arc,
};

use log::warn;
use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};

use crate::Result;

/// Signals that end a transmission.
pub const TERMINATION_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Set once a termination signal is caught. Never reset.
///
/// The supervising loop polls [`Self::is_raised`] between streaming checks. The signal
/// number is diagnostic only and may lag the flag by one store.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    raised: AtomicBool,
    signal: AtomicI32,
}

impl TerminationSignal {
    /// A flag that has not been raised.
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            signal: AtomicI32::new(0),
        }
    }

    /// Creates a flag raised by any of [`TERMINATION_SIGNALS`].
    ///
    /// Signals are received on a background thread for the rest of the process lifetime.
    ///
    /// # Errors
    /// Fails if the handlers cannot be registered or the thread cannot be spawned.
    pub fn install() -> Result<Arc<Self>> {
        let flag = Arc::new(Self::new());
        let mut signals = Signals::new(TERMINATION_SIGNALS)?;

        let handler_flag = Arc::clone(&flag);
        std::thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    warn!("Caught signal {signal}");
                    handler_flag.raise(signal);
                }
            })?;

        Ok(flag)
    }

    /// Marks the process as terminating because of `signal`.
    pub fn raise(&self, signal: i32) {
        self.signal.store(signal, Ordering::Relaxed);
        self.raised.store(true, Ordering::Relaxed);
    }

    /// Returns true once any termination signal was caught.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    /// Number of the most recently caught signal.
    pub fn last_signal(&self) -> Option<i32> {
        match self.signal.load(Ordering::Relaxed) {
            0 => None,
            signal => Some(signal),
        }
    }
}

//! Group-wide timeout for a measurement pass.

use std::io::{self, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::coordinator::{AbortHandle, Identity};
use crate::error::{new_os_error, Error, ErrorKind};

/// A supervisory timer that runs a callback if it is not disarmed in time.
///
/// The callback runs on the watchdog's own thread, so it fires even while
/// the armed thread is blocked inside a counter call or a barrier.
#[derive(Debug)]
pub struct Watchdog {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a watchdog that calls `on_expire` after `timeout`.
    ///
    /// A zero `timeout` never fires. Fails if the watchdog thread cannot be
    /// started.
    pub fn arm<F>(timeout: Duration, on_expire: F) -> Result<Self, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        if timeout == Duration::from_secs(0) {
            debug!("watchdog disabled");
            return Ok(Watchdog {
                cancel: None,
                thread: None,
            });
        }

        let (tx, rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || match rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => on_expire(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            });

        let dog = Self::spawned(tx, thread)?;
        info!(timeout_secs = timeout.as_secs(), "watchdog armed");
        Ok(dog)
    }

    fn spawned(cancel: Sender<()>, thread: io::Result<JoinHandle<()>>) -> Result<Self, Error> {
        let thread = thread.map_err(|e| {
            new_os_error(ErrorKind::Coordination("start watchdog".to_string()), e)
        })?;
        Ok(Watchdog {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    /// True while the watchdog thread is waiting.
    pub fn is_armed(&self) -> bool {
        self.thread.is_some()
    }

    /// Cancel the watchdog and wait for its thread to exit.
    ///
    /// Does nothing if the watchdog already fired or was never armed.
    pub fn disarm(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("watchdog disarmed");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Report an expired watchdog to `out` and abort the whole group with exit
/// code 1.
pub fn expire<W: Write>(
    out: &mut W,
    program: &str,
    timeout: Duration,
    id: Identity,
    abort: AbortHandle,
) -> ! {
    // The group is going down either way.
    let _ = writeln!(
        out,
        "{}: watchdog expired after {} secs (rank {})",
        program,
        timeout.as_secs(),
        id.rank
    );
    let _ = writeln!(out, "Alarm clock");
    let _ = out.flush();
    abort.abort(1)
}

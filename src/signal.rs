//! Start/cancel signalling and step pacing for the engine thread

use crate::error::{MirrorError, Result};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    started: bool,
    cancelled: bool,
}

/// Shared between the engine thread and whoever controls it.
///
/// Both flags are one-way: once set they stay set.
#[derive(Debug, Default)]
pub struct Signals {
    state: Mutex<State>,
    cond: Condvar,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.state.lock().started = true;
        self.cond.notify_all();
    }

    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.cond.notify_all();
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Block until started; fails with `Cancelled` if cancel comes first
    pub fn wait_for_start(&self) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(MirrorError::Cancelled);
            }
            if state.started {
                return Ok(());
            }
            self.cond.wait(&mut state);
        }
    }

    /// Sleep for `delay` unless cancelled in the meantime
    pub fn pause(&self, delay: Duration) -> Result<()> {
        let mut state = self.state.lock();
        // Past the clock's range: only a cancel ends the wait
        let Some(deadline) = Instant::now().checked_add(delay) else {
            while !state.cancelled {
                self.cond.wait(&mut state);
            }
            return Err(MirrorError::Cancelled);
        };
        while !state.cancelled {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return if state.cancelled {
                    Err(MirrorError::Cancelled)
                } else {
                    Ok(())
                };
            }
        }
        Err(MirrorError::Cancelled)
    }
}

/// Delays between engine steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After the start signal, before enumerating
    pub settle: Duration,
    /// Between the setup steps
    pub step: Duration,
    /// Between two file transfers
    pub transfer: Duration,
    /// Before the finished notification when auto-closing
    pub finish: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            step: Duration::from_millis(500),
            transfer: Duration::from_millis(10),
            finish: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No delays at all
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            step: Duration::ZERO,
            transfer: Duration::ZERO,
            finish: Duration::ZERO,
        }
    }
}

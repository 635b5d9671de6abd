use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Result, bail};

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Deadline and hand-off state shared between a caller and one store call.
///
/// A store must call [`StoreContext::begin`] right before it executes its
/// statement. Whichever side moves the state first wins: either the statement
/// runs and its result is the answer, or the caller gave up and the statement
/// never runs.
#[derive(Debug, Clone)]
pub struct StoreContext {
    deadline: Instant,
    state: Arc<AtomicU8>,
}

impl StoreContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }

    /// Claims the call for execution. Fails if the caller abandoned it or the
    /// deadline has passed.
    pub fn begin(&self) -> Result<()> {
        if self.remaining().is_none() {
            // Also closes the door on the caller side.
            self.abandon();
            bail!("store deadline passed before the statement started");
        }

        match self
            .state
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(STARTED) => Ok(()),
            Err(_) => bail!("store call was abandoned by the caller"),
        }
    }

    /// Marks the call abandoned. Returns `false` when the statement already
    /// started, in which case its outcome must be awaited.
    pub fn abandon(&self) -> bool {
        match self
            .state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(ABANDONED) => true,
            Err(_) => false,
        }
    }
}

//! Fault containment for the acquisition pipeline
//!
//! The monitor starts out safe, is armed once after a successful
//! initialization, and falls back to safe on the first fault. There is no way
//! back to armed; a new monitor (i.e. a restart) is required.

use crate::error::TelemetryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Whether periodic sampling may touch the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    /// Scheduler disabled, bus idle
    Safe,
    /// Scheduler active, bus available
    Armed,
}

/// Anything that owns a chip-select line and can drive it idle
pub trait ForceIdle {
    /// Release the bus unconditionally, swallowing pin errors
    fn force_idle(&mut self);
}

/// Stop switch for a running periodic timer
#[derive(Debug, Clone, Default)]
pub struct TimerControl {
    running: Arc<AtomicBool>,
}

impl TimerControl {
    pub(crate) fn new_running() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn disarm(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SafetyInner {
    armed: AtomicBool,
    timer: Mutex<Option<TimerControl>>,
    fault: Mutex<Option<String>>,
}

/// Process-wide safety flag, shared by the sampler and its scheduler
#[derive(Clone, Default)]
pub struct SafetyMonitor {
    inner: Arc<SafetyInner>,
}

impl SafetyMonitor {
    /// New monitor in the safe state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SafetyState {
        if self.is_armed() {
            SafetyState::Armed
        } else {
            SafetyState::Safe
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Description of the fault that tripped the monitor, if any
    pub fn fault(&self) -> Option<String> {
        self.inner
            .fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Safe → armed; refused once a fault has been recorded
    pub(crate) fn arm(&self) -> bool {
        if self.fault().is_some() {
            return false;
        }
        self.inner.armed.store(true, Ordering::SeqCst);
        true
    }

    /// Register the timer that `enter_safe_state` must stop
    pub(crate) fn attach_timer(&self, timer: TimerControl) {
        *self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(timer);
    }

    /// Disable sampling, idle the bus and hand `error` back to the caller
    ///
    /// Safe to call repeatedly. A missing timer is not an error.
    pub fn enter_safe_state<B: ForceIdle>(&self, bus: &mut B, error: TelemetryError) -> TelemetryError {
        let was_armed = self.inner.armed.swap(false, Ordering::SeqCst);

        if let Some(timer) = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            timer.disarm();
        }

        bus.force_idle();

        let mut fault = self
            .inner
            .fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if fault.is_none() {
            *fault = Some(error.to_string());
            log::error!("SAFE STATE: Error -> {}", error);
        } else {
            log::debug!("Already safe (armed={}), ignoring: {}", was_armed, error);
        }

        error
    }
}

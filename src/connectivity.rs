//! Network reachability.
//!
//! [`Connectivity`] answers "may we fetch now?" from a live
//! [`ConnectivityProbe`], unless an override has been set with
//! [`Connectivity::set_connected`]. The process-wide instance is installed
//! once with [`init_global`] and read with [`global`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::info;

const NO_OVERRIDE: u8 = 0;
const FORCED_OFFLINE: u8 = 1;
const FORCED_ONLINE: u8 = 2;

static GLOBAL: OnceLock<Arc<Connectivity>> = OnceLock::new();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("connectivity has already been initialised")]
    AlreadyInitialized,
}

/// Live source of reachability.
pub trait ConnectivityProbe: Send + Sync + fmt::Debug {
    fn is_connected(&self) -> bool;
}

/// Probe that always reports connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Reachability with an override slot that beats the probe.
#[derive(Debug)]
pub struct Connectivity {
    probe: Box<dyn ConnectivityProbe>,
    forced: AtomicU8,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(AlwaysOnline)
    }
}

impl Connectivity {
    pub fn new(probe: impl ConnectivityProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            forced: AtomicU8::new(NO_OVERRIDE),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        match self.forced.load(Ordering::SeqCst) {
            FORCED_ONLINE => true,
            FORCED_OFFLINE => false,
            _ => self.probe.is_connected(),
        }
    }

    /// `Some(state)` forces reachability; `None` returns to the probe.
    pub fn set_connected(&self, connected: Option<bool>) {
        let forced = match connected {
            Some(true) => FORCED_ONLINE,
            Some(false) => FORCED_OFFLINE,
            None => NO_OVERRIDE,
        };
        self.forced.store(forced, Ordering::SeqCst);
        info!(?connected, "connectivity override changed");
    }

    #[must_use]
    pub fn override_state(&self) -> Option<bool> {
        match self.forced.load(Ordering::SeqCst) {
            FORCED_ONLINE => Some(true),
            FORCED_OFFLINE => Some(false),
            _ => None,
        }
    }
}

/// Installs the process-wide connectivity state.
///
/// # Errors
///
/// Returns [`ConnectivityError::AlreadyInitialized`] on any call after the
/// first, or after [`global`] has lazily installed the default.
pub fn init_global(probe: impl ConnectivityProbe + 'static) -> Result<(), ConnectivityError> {
    GLOBAL
        .set(Arc::new(Connectivity::new(probe)))
        .map_err(|_| ConnectivityError::AlreadyInitialized)
}

/// The process-wide connectivity state, defaulting to [`AlwaysOnline`].
#[must_use]
pub fn global() -> Arc<Connectivity> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(Connectivity::default())))
}

//! Service mode state.
//!
//! A [`ModeState`] starts in [`ServiceMode::Primary`] and moves to
//! [`ServiceMode::Fallback`] at most once. There is no transition back: a
//! fresh state object is the only way to use the primary again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Which backend serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// The remote primary.
    #[default]
    Primary,
    /// The local fallback.
    Fallback,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Primary => write!(f, "primary"),
            ServiceMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// Shared, one-directional mode cell.
#[derive(Debug, Default)]
pub struct ModeState {
    fallback: AtomicBool,
}

impl ModeState {
    /// Creates a state in [`ServiceMode::Primary`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The current mode.
    pub fn current(&self) -> ServiceMode {
        if self.fallback.load(Ordering::Acquire) {
            ServiceMode::Fallback
        } else {
            ServiceMode::Primary
        }
    }

    /// True once the fallback has taken over.
    pub fn is_fallback(&self) -> bool {
        self.current() == ServiceMode::Fallback
    }

    /// Switches to fallback. Returns true only for the call that performed
    /// the transition.
    pub fn enter_fallback(&self) -> bool {
        !self.fallback.swap(true, Ordering::AcqRel)
    }
}

//! Plugin lifecycle states.
//!
//! Forward order is `Unloaded → Loaded → Initialized → Activated → Processing`.
//! Teardown walks the same ladder downwards, one rung at a time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No binary open.
    Unloaded,
    /// Instance created and `init` returned true.
    Loaded,
    /// Extensions probed, parameters cached, presets discovered.
    Initialized,
    /// `activate` succeeded.
    Activated,
    /// `start_processing` succeeded; render calls reach the plugin.
    Processing,
}

impl LifecycleState {
    /// Whether `next` is one rung away from `self`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unloaded, Loaded)
                | (Loaded, Initialized)
                | (Initialized, Activated)
                | (Activated, Processing)
                | (Processing, Activated)
                | (Activated, Initialized)
                | (Initialized, Unloaded)
                | (Loaded, Unloaded)
        )
    }

    pub fn is_loaded(self) -> bool {
        self != LifecycleState::Unloaded
    }

    pub fn is_active(self) -> bool {
        self >= LifecycleState::Activated
    }

    pub fn is_processing(self) -> bool {
        self == LifecycleState::Processing
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Unloaded => write!(f, "unloaded"),
            LifecycleState::Loaded => write!(f, "loaded"),
            LifecycleState::Initialized => write!(f, "initialized"),
            LifecycleState::Activated => write!(f, "activated"),
            LifecycleState::Processing => write!(f, "processing"),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::models::chat::SessionId;

/// How the window is cut from the full history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Most recent messages under budget, nothing pinned
    KeepLast,
    /// Most recent system message always kept, the rest filled newest-first
    #[default]
    KeepLastWithSystemPinned,
}

/// Window policy configuration, owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Max cost units (or messages, with `MessageCounter`)
    pub budget: usize,

    #[serde(default)]
    pub strategy: WindowStrategy,

    /// Whether system messages take part in the window at all
    #[serde(default = "default_include_system")]
    pub include_system: bool,
}

fn default_include_system() -> bool {
    true
}

impl WindowConfig {
    pub fn new(budget: usize, strategy: WindowStrategy, include_system: bool) -> Self {
        Self {
            budget,
            strategy,
            include_system,
        }
    }

    pub fn keep_last(budget: usize) -> Self {
        Self::new(budget, WindowStrategy::KeepLast, false)
    }

    pub fn pinned(budget: usize) -> Self {
        Self::new(budget, WindowStrategy::KeepLastWithSystemPinned, true)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        // 3 exchanges
        Self::pinned(6)
    }
}

/// Per-call context handed to the generation invoker alongside the window
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,

    /// Messages in the full log at the time the window was cut
    pub history_len: usize,

    /// Cost of the window as reported by the estimator
    pub window_cost: usize,
}

/// Operational counters and totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub active_sessions: usize,
    pub total_messages: usize,
    pub turns_started: u64,
    pub turns_completed: u64,
    pub generation_failures: u64,
    pub estimation_failures: u64,
    pub cancellations: u64,
}

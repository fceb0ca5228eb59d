//! Conversation memory management module
//!
//! Provides per-session message history with:
//! - Thread-safe session store (DashMap, per-session locks)
//! - Pluggable cost estimation (message count, token heuristic)
//! - Budgeted window selection with optional system pinning
//! - Turn orchestration around an external generation service

mod session_log;
mod store;
mod token_counter;
mod window;
pub mod manager;
pub mod types;

pub use manager::{GenerationInvoker, MemoryManager};
pub use session_log::{Session, SessionLog};
pub use store::SessionStore;
pub use token_counter::{CostEstimator, MessageCounter, TokenCounter};
pub use types::{MemoryStats, SessionContext, WindowConfig, WindowStrategy};
pub use window::{Window, WindowPolicy};

pub use crate::models::chat::{Message, Role, SessionId};

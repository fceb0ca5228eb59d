//! Per-session conversational memory for chat applications.
//!
//! The core is [`MemoryManager`]: it records every turn in an append-only
//! [`SessionStore`], cuts a budgeted window with [`WindowPolicy`], and hands
//! that window to an external [`GenerationInvoker`].

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use models::chat::{Message, Role, SessionId};
pub use services::conversation::{
    CostEstimator, GenerationInvoker, MemoryManager, MemoryStats, MessageCounter, SessionContext,
    SessionStore, TokenCounter, Window, WindowConfig, WindowPolicy, WindowStrategy,
};
pub use utils::error::{MemoryError, MemoryResult};

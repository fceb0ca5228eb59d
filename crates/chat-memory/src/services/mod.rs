pub mod conversation;
pub mod llm_service;

pub use conversation::MemoryManager;
pub use llm_service::LlmService;

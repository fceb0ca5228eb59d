pub mod settings;

pub use settings::{EstimatorKind, LlmConfig, MemoryConfig, PromptsConfig, Settings};

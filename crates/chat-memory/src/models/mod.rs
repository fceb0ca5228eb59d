pub mod chat;

pub use chat::{Message, Role, SessionId};

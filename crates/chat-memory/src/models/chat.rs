use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::MemoryError;

/// Maximum accepted session identifier length, in bytes
pub const MAX_SESSION_ID_LEN: usize = 128;

// ===== ROLE =====

/// Speaker of a single turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
}

impl Role {
    /// Role name on the chat-completions wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Label used when printing history
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::Human => "Human",
            Role::Assistant => "AI",
        }
    }

    pub fn is_system(self) -> bool {
        matches!(self, Role::System)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ===== MESSAGE =====

/// One recorded turn. Immutable once created; the store hands out copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    sequence: u64,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sequence: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sequence,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Same role and content, ignoring sequence and timestamp
    pub fn same_turn(&self, role: Role, content: &str) -> bool {
        self.role == role && self.content == content
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.role.label(), self.content)
    }
}

// ===== SESSION ID =====

/// Caller-supplied conversation key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, MemoryError> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(MemoryError::invalid_session_id("empty identifier"));
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(MemoryError::invalid_session_id(format!(
                "identifier is {} bytes, max {}",
                raw.len(),
                MAX_SESSION_ID_LEN
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(MemoryError::invalid_session_id("contains control characters"));
        }
        if raw.trim().is_empty() {
            return Err(MemoryError::invalid_session_id("whitespace-only identifier"));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for SessionId {
    type Error = MemoryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for SessionId {
    type Error = MemoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

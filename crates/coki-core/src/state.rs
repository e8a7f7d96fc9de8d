//! UI-agnostic application state types
//!
//! These are shared between the chat session, the transport adapters and
//! whatever front end renders them. None of them depend on a UI framework.

use serde::{Deserialize, Serialize};

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Who a turn is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Role name as the Gemini API expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    AwaitingResponse,
}

/// The three top-level screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Search,
    Image,
    Chat,
}

impl AppMode {
    pub fn all() -> [AppMode; 3] {
        [AppMode::Search, AppMode::Image, AppMode::Chat]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "search" => Some(AppMode::Search),
            "image" => Some(AppMode::Image),
            "chat" => Some(AppMode::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::Search => "search",
            AppMode::Image => "image",
            AppMode::Chat => "chat",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AppMode::Search => "Search",
            AppMode::Image => "Create",
            AppMode::Chat => "Chat",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            AppMode::Search => AppMode::Image,
            AppMode::Image => AppMode::Chat,
            AppMode::Chat => AppMode::Search,
        }
    }
}

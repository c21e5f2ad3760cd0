use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::span::FlatSpan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TurnType {
    SessionManagement,
    UserTurn,
    AssistantTurn,
}

impl TurnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionManagement => "session_management",
            Self::UserTurn => "user_turn",
            Self::AssistantTurn => "assistant_turn",
        }
    }
}

impl fmt::Display for TurnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span names that open a new conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelKind {
    UserTurn,
    AssistantTurn,
    StartAgentActivity,
    DrainAgentActivity,
}

impl SentinelKind {
    pub const ALL: [SentinelKind; 4] = [
        Self::UserTurn,
        Self::AssistantTurn,
        Self::StartAgentActivity,
        Self::DrainAgentActivity,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "user_turn" => Some(Self::UserTurn),
            "assistant_turn" => Some(Self::AssistantTurn),
            "start_agent_activity" => Some(Self::StartAgentActivity),
            "drain_agent_activity" => Some(Self::DrainAgentActivity),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UserTurn => "user_turn",
            Self::AssistantTurn => "assistant_turn",
            Self::StartAgentActivity => "start_agent_activity",
            Self::DrainAgentActivity => "drain_agent_activity",
        }
    }

    pub fn turn_type(self) -> TurnType {
        match self {
            Self::UserTurn => TurnType::UserTurn,
            Self::AssistantTurn => TurnType::AssistantTurn,
            Self::StartAgentActivity | Self::DrainAgentActivity => TurnType::SessionManagement,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    #[serde(rename = "type")]
    pub turn_type: TurnType,
    pub title: String,
    pub spans: Vec<FlatSpan>,
    #[serde(rename = "startTime")]
    pub start_time_ns: i64,
    /// Sum of member `durationMs`, not wall-clock time.
    #[serde(rename = "duration")]
    pub duration_ms: f64,
}

impl ConversationTurn {
    pub fn sentinel(&self) -> Option<&FlatSpan> {
        self.spans.first()
    }
}

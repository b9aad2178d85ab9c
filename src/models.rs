//! Core data model for the answer-synthesis pipeline

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Kind of a normalized search/memory hit.
///
/// `Document`, `Web` and `Memory` are the three merge groups; the platform
/// variants are web subtypes produced by platform-targeted search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Document,
    Web,
    Memory,
    Linkedin,
    Github,
    Reddit,
    Glassdoor,
    News,
}

impl SourceKind {
    /// Whether this kind belongs to the web merge group
    pub const fn is_web(self) -> bool {
        matches!(
            self,
            Self::Web | Self::Linkedin | Self::Github | Self::Reddit | Self::Glassdoor | Self::News
        )
    }
}

/// A normalized search/memory hit. Created per-request by an adapter and
/// never persisted standalone; it exists only inside a [`Turn`] or
/// transiently in the response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    /// May be a placeholder such as `#memory` for non-web sources
    pub url: String,
    pub snippet: String,
    pub kind: SourceKind,
    /// Provider ranking signal; absence means "unscored, keep fan-out order"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl Source {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        kind: SourceKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            kind,
            relevance_score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

/// One user/assistant exchange.
///
/// Invariant: citation markers `[n]` embedded in `answer` correspond to
/// `sources[n-1]`; indices are assigned at context-assembly time and stay
/// stable through prompt construction and completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatbot_id: Option<String>,
    /// Set when a cancelled or failed stream left a partial answer behind
    #[serde(default)]
    pub incomplete: bool,
}

impl Turn {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: String::new(),
            sources: Vec::new(),
            timestamp: Utc::now(),
            user_id: None,
            chatbot_id: None,
            incomplete: false,
        }
    }
}

/// Optional grounding object attached to a conversation. Presence switches
/// the classifier and prompt builder into representative mode. Immutable for
/// the life of the conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyContext {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Key into the document index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Conversation message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message as sent to and from LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_groups() {
        assert!(SourceKind::Linkedin.is_web());
        assert!(SourceKind::News.is_web());
        assert!(!SourceKind::Document.is_web());
        assert!(!SourceKind::Memory.is_web());
    }

    #[test]
    fn source_serializes_kind_lowercase() {
        let source = Source::new("t", "u", "s", SourceKind::Document);
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["kind"], "document");
        assert!(json.get("relevance_score").is_none());
    }

    #[test]
    fn turn_starts_empty_and_complete() {
        let turn = Turn::new("what is this?");
        assert!(turn.answer.is_empty());
        assert!(turn.sources.is_empty());
        assert!(!turn.incomplete);
    }
}

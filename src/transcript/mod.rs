use crate::questions::QuestionOption;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

// ===================================================================
// Message types
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// How a message is presented, and which affordances it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    /// Single-select buttons built from `options`.
    Options,
    /// Zone cards built from `options`; multi-select.
    Zones,
    /// Free-text batch of `count` names for `zone`.
    SeparationNames,
    /// The request sent to the generator, attached as `data`.
    ApiRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            role,
            content: content.into(),
            kind,
            options: None,
            zone: None,
            count: None,
            data: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageKind::Text)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, MessageKind::Text)
    }

    pub fn options(content: impl Into<String>, options: Vec<QuestionOption>) -> Self {
        Self {
            options: Some(options),
            ..Self::new(Role::Assistant, content, MessageKind::Options)
        }
    }

    pub fn zones(content: impl Into<String>, options: Vec<QuestionOption>) -> Self {
        Self {
            options: Some(options),
            ..Self::new(Role::Assistant, content, MessageKind::Zones)
        }
    }

    pub fn separation_names(content: impl Into<String>, zone: &str, count: u8) -> Self {
        Self {
            zone: Some(zone.to_string()),
            count: Some(count),
            ..Self::new(Role::Assistant, content, MessageKind::SeparationNames)
        }
    }

    pub fn api_request(content: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(Role::Assistant, content, MessageKind::ApiRequest)
        }
    }

    /// Terminal rendering of a single message.
    pub fn render(&self) -> String {
        let speaker = match self.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        let mut out = format!("{speaker}: {}", self.content);
        match self.kind {
            MessageKind::Options | MessageKind::Zones => {
                for (i, opt) in self.options.iter().flatten().enumerate() {
                    let _ = write!(out, "\n  {}) {}", i + 1, opt.label);
                    if !opt.description.is_empty() {
                        let _ = write!(out, " - {}", opt.description);
                    }
                }
            }
            MessageKind::SeparationNames => {
                if let (Some(zone), Some(count)) = (&self.zone, self.count) {
                    let _ = write!(out, "\n  (enter {count} name(s) for {zone})");
                }
            }
            MessageKind::ApiRequest => {
                if let Some(data) = &self.data {
                    let json = serde_json::to_string_pretty(data).unwrap_or_default();
                    for line in json.lines() {
                        let _ = write!(out, "\n  {line}");
                    }
                }
            }
            MessageKind::Text => {}
        }
        out
    }
}

pub const GREETING: &str = "Welcome to the Space Habitat Designer! I'll ask a few questions about your \
mission, then generate floor plans for the zones you choose.";

// ===================================================================
// Transcript
// ===================================================================

/// Append-only conversation log. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(greeting: ChatMessage) -> Self {
        Self {
            messages: vec![greeting],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Replace the whole conversation with a single greeting.
    pub fn reset(&mut self, greeting: ChatMessage) {
        self.messages = vec![greeting];
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The option list the user can currently pick from: the options of the
    /// latest assistant message that carries any.
    pub fn active_options(&self) -> Option<&[QuestionOption]> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| m.options.as_deref())
    }

    /// Resolve a 1-based option number against the active options, passing
    /// anything else through unchanged.
    pub fn resolve_choice(&self, input: &str) -> String {
        let input = input.trim();
        if let (Ok(n), Some(options)) = (input.parse::<usize>(), self.active_options()) {
            // Interface counts are themselves numbers; a literal match wins.
            if options.iter().any(|o| o.matches(input)) {
                return input.to_string();
            }
            if let Some(opt) = n.checked_sub(1).and_then(|i| options.get(i)) {
                return opt.value.clone();
            }
        }
        input.to_string()
    }

    /// Render every message from index `start` onward.
    pub fn render_from(&self, start: usize) -> String {
        self.messages
            .iter()
            .skip(start)
            .map(ChatMessage::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

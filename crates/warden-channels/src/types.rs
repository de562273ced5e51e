use serde::{Deserialize, Serialize};

/// An activity to be delivered back into a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundActivity {
    pub conversation_id: String,

    /// Platform-native identifier of the user being answered.
    pub recipient_id: String,

    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl OutboundActivity {
    pub fn text(
        conversation_id: impl Into<String>,
        recipient_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            recipient_id: recipient_id.into(),
            kind: ActivityKind::Message {
                text: text.into(),
                format: MessageFormat::PlainText,
            },
        }
    }

    pub fn card(
        conversation_id: impl Into<String>,
        recipient_id: impl Into<String>,
        attachment: Attachment,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            recipient_id: recipient_id.into(),
            kind: ActivityKind::Card { attachment },
        }
    }

    pub fn typing(conversation_id: impl Into<String>, recipient_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            recipient_id: recipient_id.into(),
            kind: ActivityKind::Typing,
        }
    }

    /// Text body for message activities, `None` otherwise.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            ActivityKind::Message { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Attachment content type for card activities, `None` otherwise.
    pub fn card_type(&self) -> Option<&str> {
        match &self.kind {
            ActivityKind::Card { attachment } => Some(attachment.content_type.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    Message { text: String, format: MessageFormat },
    Card { attachment: Attachment },
    /// "Processing" indicator.
    Typing,
}

/// Card payload. Rendering is the client's business; the core only picks
/// the content type and fills the fields the card template needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: serde_json::Value,
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    PlainText,
    Markdown,
}

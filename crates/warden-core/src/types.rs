use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Whether a turn is an ordinary message or a synchronous invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Message,
    Invoke,
}

/// Immutable snapshot of one inbound event.
///
/// Built by the transport edge, consumed by the turn processor and dropped
/// once the turn has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Correlation id carried into every log line for this turn.
    pub request_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    /// The bot's own id as addressed by the platform.
    pub recipient_id: String,
    /// Raw text as delivered (mention markup included).
    pub text: Option<String>,
    /// Structured payload (card submit data, invoke value).
    pub value: Option<Value>,
    pub invoke: Option<InvokeRequest>,
}

impl ConversationTurn {
    pub fn message(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id: String::new(),
            text: Some(text.into()),
            value: None,
            invoke: None,
        }
    }

    pub fn invoke(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        request: InvokeRequest,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id: String::new(),
            text: None,
            value: None,
            invoke: Some(request),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = recipient_id.into();
        self
    }

    pub fn kind(&self) -> TurnKind {
        if self.invoke.is_some() {
            TurnKind::Invoke
        } else {
            TurnKind::Message
        }
    }

    /// `value.commandId`, trimmed, when present and non-empty.
    pub fn command_id(&self) -> Option<&str> {
        self.value
            .as_ref()
            .and_then(|v| v.get("commandId"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Text with mention markup stripped; `None` when nothing is left.
    pub fn normalized_text(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(strip_mentions)
            .filter(|s| !s.is_empty())
    }

    /// What the command router matches on: the normalized text, else the
    /// card's `commandId`.
    pub fn command_text(&self) -> Option<String> {
        self.normalized_text()
            .or_else(|| self.command_id().map(String::from))
    }
}

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<at>.*?</at>").expect("mention regex"));

/// Remove every `<at>…</at>` mention and trim the result.
pub fn strip_mentions(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

/// Platform invoke subtypes the bot understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum InvokeRequest {
    /// `signin/verifyState`: carries the magic code / state string.
    SigninVerify { state: Option<String> },
    /// `signin/tokenExchange`: carries an exchangeable SSO token.
    SigninTokenExchange {
        id: Option<String>,
        connection_name: Option<String>,
        token: Option<String>,
    },
    /// `composeExtension/query`: handler resolved by `commandId`.
    ExtQuery {
        command_id: Option<String>,
        query: Value,
    },
    /// `composeExtension/selectItem`: handler resolved by the item's `id`.
    ExtSelectItem { id: Option<String>, item: Value },
    /// `task/fetch`: handler resolved by `data.commandId`.
    TaskFetch {
        command_id: Option<String>,
        request: Value,
    },
    /// `task/submit`: handler resolved by `data.commandId`.
    TaskSubmit {
        command_id: Option<String>,
        request: Value,
    },
    Unsupported { name: String },
}

impl InvokeRequest {
    /// Decode from the platform's invoke `name` and `value`.
    pub fn from_activity(name: &str, value: &Value) -> Self {
        let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(String::from);
        let data_command = |v: &Value| {
            v.get("data")
                .and_then(|d| d.get("commandId"))
                .and_then(Value::as_str)
                .map(String::from)
        };
        match name {
            "signin/verifyState" => InvokeRequest::SigninVerify {
                state: str_field(value, "state"),
            },
            "signin/tokenExchange" => InvokeRequest::SigninTokenExchange {
                id: str_field(value, "id"),
                connection_name: str_field(value, "connectionName"),
                token: str_field(value, "token"),
            },
            "composeExtension/query" => InvokeRequest::ExtQuery {
                command_id: str_field(value, "commandId"),
                query: value.clone(),
            },
            "composeExtension/selectItem" => InvokeRequest::ExtSelectItem {
                id: str_field(value, "id"),
                item: value.clone(),
            },
            "task/fetch" => InvokeRequest::TaskFetch {
                command_id: data_command(value),
                request: value.clone(),
            },
            "task/submit" => InvokeRequest::TaskSubmit {
                command_id: data_command(value),
                request: value.clone(),
            },
            other => InvokeRequest::Unsupported {
                name: other.to_string(),
            },
        }
    }

    /// Platform name of this subtype, used in logs and error codes.
    pub fn subtype(&self) -> &str {
        match self {
            InvokeRequest::SigninVerify { .. } => "signin/verifyState",
            InvokeRequest::SigninTokenExchange { .. } => "signin/tokenExchange",
            InvokeRequest::ExtQuery { .. } => "composeExtension/query",
            InvokeRequest::ExtSelectItem { .. } => "composeExtension/selectItem",
            InvokeRequest::TaskFetch { .. } => "task/fetch",
            InvokeRequest::TaskSubmit { .. } => "task/submit",
            InvokeRequest::Unsupported { name } => name,
        }
    }

    pub fn is_signin(&self) -> bool {
        matches!(
            self,
            InvokeRequest::SigninVerify { .. } | InvokeRequest::SigninTokenExchange { .. }
        )
    }
}

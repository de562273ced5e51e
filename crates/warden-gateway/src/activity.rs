//! Inbound platform activity, as posted to `/api/messages`.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use warden_core::{ConversationTurn, InvokeRequest};

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    /// Invoke name, e.g. `signin/verifyState`.
    pub name: Option<String>,
    pub text: Option<String>,
    pub value: Option<Value>,
    pub from: Account,
    pub recipient: Option<Account>,
    pub conversation: Account,
}

impl Activity {
    /// Turn for `message` and `invoke` activities; `None` for everything
    /// else (conversation updates, typing, reactions).
    pub fn into_turn(self) -> Option<ConversationTurn> {
        let invoke = match self.kind.as_str() {
            "message" => None,
            "invoke" => {
                let name = self.name.as_deref().unwrap_or_default();
                let value = self.value.clone().unwrap_or(Value::Null);
                Some(InvokeRequest::from_activity(name, &value))
            }
            _ => return None,
        };
        Some(ConversationTurn {
            request_id: self.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            conversation_id: self.conversation.id,
            sender_id: self.from.id,
            recipient_id: self.recipient.map(|r| r.id).unwrap_or_default(),
            text: self.text,
            value: self.value,
            invoke,
        })
    }
}

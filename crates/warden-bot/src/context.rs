use std::sync::Arc;

use warden_channels::{Attachment, Channel, ChannelError, OutboundActivity};
use warden_core::ConversationTurn;

/// One turn plus the channel its replies go out on.
pub struct TurnContext {
    turn: ConversationTurn,
    channel: Arc<dyn Channel>,
}

impl TurnContext {
    pub fn new(turn: ConversationTurn, channel: Arc<dyn Channel>) -> Self {
        Self { turn, channel }
    }

    pub fn turn(&self) -> &ConversationTurn {
        &self.turn
    }

    pub fn user_id(&self) -> &str {
        &self.turn.sender_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.turn.conversation_id
    }

    pub fn request_id(&self) -> &str {
        &self.turn.request_id
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.channel
            .send(&OutboundActivity::text(
                &self.turn.conversation_id,
                &self.turn.sender_id,
                text,
            ))
            .await
    }

    pub async fn send_card(&self, attachment: Attachment) -> Result<(), ChannelError> {
        self.channel
            .send(&OutboundActivity::card(
                &self.turn.conversation_id,
                &self.turn.sender_id,
                attachment,
            ))
            .await
    }

    pub async fn send_typing(&self) -> Result<(), ChannelError> {
        self.channel
            .send(&OutboundActivity::typing(
                &self.turn.conversation_id,
                &self.turn.sender_id,
            ))
            .await
    }
}

use async_trait::async_trait;

use crate::{error::ChannelError, types::OutboundActivity};

/// Outbound half of the transport adapter that delivered the turn.
///
/// Implementations must be `Send + Sync` so a single channel can be shared
/// by every component that replies during a turn.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"msteams"`).
    fn name(&self) -> &str;

    /// Deliver a single outbound activity.
    ///
    /// This is `&self` so the dialog engine, router and handlers can all
    /// reply through the same shared reference.
    async fn send(&self, activity: &OutboundActivity) -> Result<(), ChannelError>;
}

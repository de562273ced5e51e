use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The reply buffer was already handed back to the platform.
    #[error("Channel {channel} is closed")]
    Closed { channel: String },
}

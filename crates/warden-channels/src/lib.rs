pub mod buffered;
pub mod channel;
pub mod error;
pub mod types;

pub use buffered::BufferedChannel;
pub use channel::Channel;
pub use error::ChannelError;
pub use types::{ActivityKind, Attachment, MessageFormat, OutboundActivity};

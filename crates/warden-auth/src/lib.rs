//! Token acquisition for Warden: the platform → backend → downstream chain.

pub mod backend;
pub mod cache;
pub mod downstream;
pub mod error;
pub mod obo;
pub mod pkce;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod token;

pub use cache::TokenCache;
pub use downstream::DownstreamClient;
pub use error::{AuthError, ExchangeError};
pub use resolver::{TokenChainResolver, TokenOutcome};
pub use retry::RetryPolicy;
pub use store::{HttpTokenStore, MemoryTokenStore, PlatformToken, TokenStore};
pub use token::{Hop, TokenChainLink};

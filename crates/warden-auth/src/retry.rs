use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};
use warden_core::config::HttpConfig;

use crate::error::ExchangeError;
use crate::token::Hop;

/// Attempt budget for one outbound hop.
///
/// Only [`ExchangeError::is_retryable`] failures are retried, with linear
/// back-off `base_delay * attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(http: &HttpConfig) -> Self {
        Self {
            max_attempts: http.max_attempts.max(1),
            base_delay: Duration::from_millis(http.retry_base_delay_ms),
        }
    }

    pub async fn run<T, F, Fut>(&self, hop: Hop, mut op: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(%hop, attempt, "exchange succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(%hop, attempt, err = %e, "exchange attempt failed");
                    if !e.is_retryable() || attempt >= max {
                        return Err(e);
                    }
                    tokio::time::sleep(self.base_delay * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

use async_trait::async_trait;

use crate::domain::notification::StatusChanged;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("timed out after {0} ms")]
    Timeout(u128),
}

/// One outbound channel (bot, dashboard, email).
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    fn channel(&self) -> &'static str;

    /// Attempts made before the dispatcher gives up on this channel.
    fn max_attempts(&self) -> u32 {
        1
    }

    /// `Ok(false)` means the channel had nothing to do for this event (for
    /// example the customer left no email).
    async fn notify(&self, event: &StatusChanged) -> Result<bool, NotifyError>;
}

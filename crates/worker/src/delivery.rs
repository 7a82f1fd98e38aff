//! Hands a finished generation to the outside world.
//!
//! A clip is uploaded and its link posted; a failure is posted as a
//! prefixed notice. Delivery problems are logged and returned but never
//! retried here: the notifier has its own retry loop.

use std::sync::Arc;

use reelgen_cloud::notify::{Notifier, NotifyError};
use reelgen_cloud::storage::VideoPublisher;
use reelgen_core::result::{failure_notice, GenerationResult, FAILURE_PREFIX};

/// Text posted when the queue rejects a request.
pub const BUSY_MESSAGE: &str = "The video generator is busy right now. Please try again in a minute.";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to notify channel {channel}: {source}")]
    Notify {
        channel: String,
        #[source]
        source: NotifyError,
    },
}

/// Text posted for accepted work the service could not finish before
/// shutting down.
pub const SHUTDOWN_MESSAGE: &str =
    "The video generator restarted before your clip was ready. Please ask again.";

/// What reached the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Link(String),
    Failure(String),
}

pub struct Delivery {
    publisher: Arc<dyn VideoPublisher>,
    notifier: Arc<dyn Notifier>,
}

impl Delivery {
    pub fn new(publisher: Arc<dyn VideoPublisher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            publisher,
            notifier,
        }
    }

    /// Publish the clip (if any) and post the outcome to `channel`.
    pub async fn deliver(
        &self,
        channel: &str,
        result: GenerationResult,
    ) -> Result<Delivered, DeliveryError> {
        let delivered = match result {
            GenerationResult::Video { bytes } => match self.publisher.publish(bytes).await {
                Ok(link) => Delivered::Link(link),
                Err(e) => {
                    tracing::error!(channel, error = %e, "Clip upload failed");
                    Delivered::Failure(format!("{FAILURE_PREFIX}Upload failed: {e}"))
                }
            },
            GenerationResult::Failed { kind, message } => {
                Delivered::Failure(failure_notice(kind, &message))
            }
        };

        let text = match &delivered {
            Delivered::Link(link) => link.as_str(),
            Delivered::Failure(notice) => notice.as_str(),
        };
        self.post(channel, text).await?;
        Ok(delivered)
    }

    /// Tell `channel` its request was turned away.
    pub async fn notify_busy(&self, channel: &str) -> Result<(), DeliveryError> {
        self.post(channel, &format!("{FAILURE_PREFIX}{BUSY_MESSAGE}"))
            .await
    }

    /// Tell `channel` its accepted request was dropped by a shutdown.
    pub async fn notify_shutdown(&self, channel: &str) -> Result<(), DeliveryError> {
        self.post(channel, &format!("{FAILURE_PREFIX}{SHUTDOWN_MESSAGE}"))
            .await
    }

    async fn post(&self, channel: &str, text: &str) -> Result<(), DeliveryError> {
        self.notifier
            .post(channel, text)
            .await
            .map_err(|source| DeliveryError::Notify {
                channel: channel.to_string(),
                source,
            })
    }
}

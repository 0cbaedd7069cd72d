//! Chat delivery.

pub mod slack;

pub use slack::SlackDelivery;

use crate::error::ReportError;
use async_trait::async_trait;

/// Posts text and images to a chat channel.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_text(&self, channel: &str, markdown: &str) -> Result<(), ReportError>;

    async fn send_image(&self, channel: &str, image: &[u8], caption: &str) -> Result<(), ReportError>;
}

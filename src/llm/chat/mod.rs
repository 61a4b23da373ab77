pub mod openai;

use async_trait::async_trait;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;

use crate::models::api::OutboundMessage;

/// A lazy, finite sequence of text fragments from the completion service.
/// Not restartable; dropping it stops further reads.
pub type TokenStream = Pin<
    Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>
>;

/// Streaming completion capability. The credential travels with each call
/// because it is supplied by the end user per request, not configured on
/// the client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        messages: &[OutboundMessage]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>;
}

/// Forwarding of user files to the completion service's upload facility.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(
        &self,
        api_key: &str,
        file_name: &str,
        bytes: Vec<u8>
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;
}

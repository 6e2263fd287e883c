use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::errors::GatewayError;
use crate::domain::value_objects::FeedSource;

/// Media chunks from the gateway, in arrival order. Ends when the gateway closes.
pub type FeedStream = BoxStream<'static, Result<Vec<u8>, GatewayError>>;

/// Port for opening a camera feed through the gateway
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, source: &FeedSource) -> Result<FeedStream, GatewayError>;
}

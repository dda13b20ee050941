//! Command publisher port, the outbound side of the transport.

use std::future::Future;

use rvc_domain::error::RvcError;

use crate::codec::OutboundMessage;

/// Hands an encoded frame to the transport.
pub trait CommandPublisher {
    /// Publish one frame. Delivery is fire-and-forget; the only failure
    /// reported is the transport refusing the frame.
    fn publish(&self, message: OutboundMessage) -> impl Future<Output = Result<(), RvcError>> + Send;
}

impl<T: CommandPublisher + Send + Sync> CommandPublisher for std::sync::Arc<T> {
    fn publish(&self, message: OutboundMessage) -> impl Future<Output = Result<(), RvcError>> + Send {
        (**self).publish(message)
    }
}

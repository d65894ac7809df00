//! The seam every listener (HTTP, WebSocket, TCP, AMQP) calls into once
//! it has normalized an incoming event into a [`crate::Message`]. Kept
//! here, rather than in `relaymesh-server`, so every transport crate can
//! depend on it without depending on the dispatcher that implements it.

use async_trait::async_trait;

use crate::message::Message;

/// Implemented by the routing dispatcher (§4.4). A listener hands it one
/// [`Message`] per incoming event; for request/response transports the
/// dispatcher ultimately replies through the Message's own response
/// sink, so this call itself never returns a value to the listener.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, message: Message);
}

//! AMQP listener for relaymesh (§4.6, §6.4): connects to a broker with
//! auto-reconnect, declares a queue or an exchange-bound queue, and
//! delivers each message to the dispatcher with no response path.

mod config;
mod error;
mod listener;

pub use config::{AmqpListenerConfig, AmqpTarget, QueueFlags};
pub use error::{AmqpError, AmqpResult};
pub use listener::serve;

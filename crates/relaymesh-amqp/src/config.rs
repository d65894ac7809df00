//! AMQP listener configuration (§6.4): broker URL, exactly one of
//! `queue`/`exchange`, exchange type, the standard queue flags, and the
//! reconnect retry delay.

use std::time::Duration;

use crate::error::{AmqpError, AmqpResult};

/// What this listener consumes from: a plain queue, or an exchange it
/// declares and binds a queue to.
#[derive(Debug, Clone)]
pub enum AmqpTarget {
    Queue(String),
    Exchange {
        name: String,
        /// Exchange type (default `topic`, per §C.7 / the original's
        /// `rabbit_exchange_example` behavior).
        kind: String,
        routing_key: Option<String>,
    },
}

/// Standard queue declaration flags (§6.4), applied to whichever queue
/// this listener ultimately consumes from (the named queue, or the
/// queue bound to the exchange).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFlags {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub passive: bool,
}

#[derive(Debug, Clone)]
pub struct AmqpListenerConfig {
    pub url: String,
    pub target: AmqpTarget,
    pub flags: QueueFlags,
    /// Delay before reconnecting after the consumer loop fails
    /// (default 10s, per §5).
    pub retry_delay: Duration,
}

impl AmqpListenerConfig {
    /// Build a queue-based listener configuration.
    #[must_use]
    pub fn queue(url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: AmqpTarget::Queue(queue.into()),
            flags: QueueFlags::default(),
            retry_delay: Duration::from_secs(10),
        }
    }

    /// Build an exchange-based listener configuration; `kind` defaults to
    /// `"topic"` per §C.7.
    #[must_use]
    pub fn exchange(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: AmqpTarget::Exchange {
                name: exchange.into(),
                kind: "topic".to_string(),
                routing_key: None,
            },
            flags: QueueFlags::default(),
            retry_delay: Duration::from_secs(10),
        }
    }

    /// Validate the mutual-exclusivity invariant of §6.4: exactly one of
    /// queue/exchange, which this type's constructors already guarantee,
    /// but is re-checked here for configs assembled from host options
    /// (§6.6) where the source data may supply both or neither.
    pub fn from_options(
        url: impl Into<String>,
        queue: Option<String>,
        exchange: Option<String>,
        exchange_type: Option<String>,
        routing_key: Option<String>,
        flags: QueueFlags,
        retry_delay: Duration,
    ) -> AmqpResult<Self> {
        let target = match (queue, exchange) {
            (Some(_), Some(_)) | (None, None) => return Err(AmqpError::TargetConflict),
            (Some(queue), None) => AmqpTarget::Queue(queue),
            (None, Some(exchange)) => AmqpTarget::Exchange {
                name: exchange,
                kind: exchange_type.unwrap_or_else(|| "topic".to_string()),
                routing_key,
            },
        };
        Ok(Self {
            url: url.into(),
            target,
            flags,
            retry_delay,
        })
    }
}

//! The AMQP listener (§4.6, §6.4): connects with auto-reconnect,
//! declares the configured queue or exchange, consumes deliveries, and
//! hands each to the dispatcher with no response path (§3.4, §7).

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use relaymesh_core::{CmsObject, Dispatch, Message, RequestInfo};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{AmqpListenerConfig, AmqpTarget, QueueFlags};
use crate::error::{AmqpError, AmqpResult};

/// Connect, declare, and consume until `shutdown` fires or the process
/// is torn down. On any connection or protocol error, logs and retries
/// after `config.retry_delay` (§5's AMQP retry policy), reconnecting
/// indefinitely.
pub async fn serve(
    config: AmqpListenerConfig,
    dispatch: Arc<dyn Dispatch>,
    mut shutdown: broadcast::Receiver<()>,
) -> AmqpResult<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("amqp listener shutting down");
                return Ok(());
            }
            result = run_once(&config, Arc::clone(&dispatch), &mut shutdown) => {
                match result {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        warn!(error = %err, "amqp consumer loop failed, reconnecting");
                    }
                }
            }
        }
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            () = tokio::time::sleep(config.retry_delay) => {}
        }
    }
}

/// One connect-declare-consume cycle. Returns `Ok(())` only when
/// `shutdown` fires mid-consume; any broker/protocol failure is
/// surfaced as an `Err` for the caller to retry.
async fn run_once(
    config: &AmqpListenerConfig,
    dispatch: Arc<dyn Dispatch>,
    shutdown: &mut broadcast::Receiver<()>,
) -> AmqpResult<()> {
    info!(url = %config.url, "amqp connection attempt");
    let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    let (queue_name, target_desc) = declare_target(&channel, &config.target, config.flags).await?;
    info!(queue = %queue_name, target = %target_desc, "amqp listener waiting for messages");

    let mut consumer = channel
        .basic_consume(
            &queue_name,
            "relaymesh-consumer",
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        handle_delivery(&config.target, &delivery.data, Arc::clone(&dispatch)).await;
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => return Err(AmqpError::ConsumerClosed),
                }
            }
        }
    }
}

async fn declare_target(
    channel: &lapin::Channel,
    target: &AmqpTarget,
    flags: QueueFlags,
) -> AmqpResult<(String, String)> {
    let queue_options = QueueDeclareOptions {
        passive: flags.passive,
        durable: flags.durable,
        exclusive: flags.exclusive,
        auto_delete: flags.auto_delete,
        nowait: false,
    };

    match target {
        AmqpTarget::Queue(name) => {
            channel
                .queue_declare(name, queue_options, FieldTable::default())
                .await?;
            Ok((name.clone(), name.clone()))
        }
        AmqpTarget::Exchange { name, kind, routing_key } => {
            channel
                .exchange_declare(
                    name,
                    exchange_kind(kind),
                    ExchangeDeclareOptions {
                        durable: flags.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            let queue = channel
                .queue_declare(
                    "",
                    QueueDeclareOptions {
                        exclusive: true,
                        auto_delete: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            let queue_name = queue.name().as_str().to_string();
            let routing_key = routing_key.clone().unwrap_or_default();
            channel
                .queue_bind(&queue_name, name, &routing_key, QueueBindOptions::default(), FieldTable::default())
                .await?;
            Ok((queue_name, format!("{name} (routing key: {routing_key})")))
        }
    }
}

fn exchange_kind(name: &str) -> ExchangeKind {
    match name {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

async fn handle_delivery(target: &AmqpTarget, body: &[u8], dispatch: Arc<dyn Dispatch>) {
    let (queue, routing_key) = match target {
        AmqpTarget::Queue(name) => (Some(name.clone()), None),
        AmqpTarget::Exchange { routing_key, .. } => (None, routing_key.clone()),
    };

    let mut cms = CmsObject::for_request(
        RequestInfo {
            method: "AMQP".to_string(),
            url: queue.clone().or_else(|| routing_key.clone()).unwrap_or_default(),
            ..RequestInfo::default()
        },
        chrono::Utc::now(),
    );
    let body_value = serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()));
    cms.set(relaymesh_core::cms::keys::BODY, body_value);
    debug!(queue = ?queue, routing_key = ?routing_key, "amqp delivery received");

    dispatch
        .dispatch(Message::Amqp {
            queue,
            routing_key,
            cms,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_kind_maps_known_names_and_falls_back_to_custom() {
        assert!(matches!(exchange_kind("topic"), ExchangeKind::Topic));
        assert!(matches!(exchange_kind("direct"), ExchangeKind::Direct));
        assert!(matches!(exchange_kind("x-custom"), ExchangeKind::Custom(ref s) if s == "x-custom"));
    }
}

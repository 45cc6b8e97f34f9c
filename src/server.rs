//! JSON-lines transport over a pair of byte streams (stdin/stdout in the binary).
//!
//! Each inbound line is `{"id"?, "address", "body"}`; each reply line is the
//! response envelope with the request's `id` echoed back. Requests run
//! concurrently, bounded by a semaphore, and replies are written as they complete.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::dispatcher::{Dispatcher, Operation};
use crate::engine::XmlEngine;
use crate::envelope::ResponseEnvelope;
use crate::error::{Result, WorkerError};
use crate::request::Request;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<Value>,
    pub address: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
}

/// Counts reported when the input stream ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    pub replies: u64,
    pub errors: u64,
}

/// Serve requests from `reader` until EOF, writing one reply line per request to `writer`.
///
/// In-flight requests are drained before returning.
pub async fn serve<E, R, W>(
    dispatcher: Arc<Dispatcher<E>>,
    reader: R,
    writer: W,
    max_in_flight: usize,
) -> Result<ServeSummary>
where
    E: XmlEngine,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let writer_task = tokio::spawn(write_replies(writer, rx));

    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| WorkerError::Concurrency {
                details: format!("Semaphore error: {}", e),
            })?;
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();

        tasks.spawn(async move {
            let reply = handle_line(&dispatcher, &line).await;
            // The writer only goes away if writing failed; that error is reported below
            let _ = tx.send(reply);
            drop(permit);
        });

        // Reap finished tasks so the set does not grow with the stream
        while let Some(joined) = tasks.try_join_next() {
            log_join_failure(joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        log_join_failure(joined);
    }
    drop(tx);

    let summary = writer_task.await.map_err(|e| WorkerError::Concurrency {
        details: format!("Join error: {}", e),
    })??;

    info!(
        replies = summary.replies,
        errors = summary.errors,
        "input closed, all requests answered"
    );
    Ok(summary)
}

fn log_join_failure(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "request task failed");
    }
}

/// Parse one inbound line and dispatch it. Never fails: every problem becomes an error reply.
pub async fn handle_line<E: XmlEngine>(dispatcher: &Dispatcher<E>, line: &str) -> OutboundMessage {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "malformed message");
            return OutboundMessage {
                id: None,
                envelope: ResponseEnvelope::error(format!("Malformed message: {}", e)),
            };
        }
    };

    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    let message: InboundMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "malformed message");
            return OutboundMessage {
                id,
                envelope: ResponseEnvelope::error(format!("Malformed message: {}", e)),
            };
        }
    };

    let request_id = id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!("request", request_id = %request_id, address = %message.address);

    let envelope = async {
        match Operation::from_address(&message.address) {
            Some(operation) => {
                let request = Request::from_json(message.body);
                dispatcher.dispatch(operation, &request).await
            }
            None => {
                warn!("unknown address");
                ResponseEnvelope::error(format!("Unknown address: {}", message.address))
            }
        }
    }
    .instrument(span)
    .await;

    OutboundMessage { id, envelope }
}

async fn write_replies<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
) -> Result<ServeSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = ServeSummary::default();

    while let Some(reply) = rx.recv().await {
        let mut line = serde_json::to_vec(&reply).map_err(|e| WorkerError::Io(e.into()))?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;

        summary.replies += 1;
        if !reply.envelope.is_ok() {
            summary.errors += 1;
        }
        debug!(replies = summary.replies, "reply written");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_message_shapes() {
        let message: InboundMessage =
            serde_json::from_value(json!({"id": 7, "address": "xpath", "body": {"xpath": "1"}}))
                .unwrap();
        assert_eq!(message.id, Some(json!(7)));
        assert_eq!(message.address, "xpath");

        let message: InboundMessage =
            serde_json::from_value(json!({"address": "validate"})).unwrap();
        assert_eq!(message.id, None);
        assert_eq!(message.body, Value::Null);

        assert!(serde_json::from_value::<InboundMessage>(json!({"body": {}})).is_err());
    }

    #[test]
    fn test_outbound_message_flattens_envelope() {
        let reply = OutboundMessage {
            id: Some(json!("abc")),
            envelope: ResponseEnvelope::ok(Some("<toto/>".to_string())),
        };
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({"id": "abc", "status": "ok", "output": "<toto/>"})
        );

        let reply = OutboundMessage {
            id: None,
            envelope: ResponseEnvelope::error("Unknown address: nowhere"),
        };
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({"status": "error", "message": "Unknown address: nowhere"})
        );
    }
}

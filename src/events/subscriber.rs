// src/events/subscriber.rs
//! WebSocket log subscriptions on the staking contract

use alloy_primitives::Address;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::policy::{classify_batch, EventAction};
use super::types::{EventKind, RawLog, StakingEvent};
use crate::config::StakingConfig;
use crate::reconcile::EngineInput;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound on the WebSocket handshake plus the subscribe requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request ids for `eth_unsubscribe` start here so they never collide with
/// the subscribe ids (1..=7)
const UNSUBSCRIBE_ID_BASE: u64 = 1000;

/// Reconnect delay, doubling per consecutive failure up to `MAX_BACKOFF`
#[derive(Debug, Default)]
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn resumed(&self) -> bool {
        self.attempt > 0
    }

    fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        backoff(self.attempt)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Holds one `eth_subscribe("logs")` per event kind for the tracked account
/// and forwards classified actions to the engine.
pub struct EventSubscriber {
    ws_url: String,
    contract: Address,
}

impl EventSubscriber {
    pub fn new(config: &StakingConfig) -> Self {
        Self::with_endpoint(config.ws_url.clone(), config.staking_contract)
    }

    pub fn with_endpoint(ws_url: impl Into<String>, contract: Address) -> Self {
        Self {
            ws_url: ws_url.into(),
            contract,
        }
    }

    /// Keep the subscriptions open until `shutdown` flips, reconnecting with
    /// backoff when the node drops the connection. After a reconnect the
    /// account is refreshed once, since logs may have been missed.
    pub async fn run(
        &self,
        account: Address,
        sink: mpsc::UnboundedSender<EngineInput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::default();
        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.run_once(account, &sink, &mut shutdown, &mut backoff).await {
                Ok(()) => return,
                Err(e) => log::warn!("Event subscription for {} dropped: {}", account, e),
            }

            if sink.is_closed() {
                return;
            }

            let delay = backoff.next_delay();
            log::info!("Reconnecting event subscriptions in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn run_once(
        &self,
        account: Address,
        sink: &mpsc::UnboundedSender<EngineInput>,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> Result<(), String> {
        let connect = async {
            let (ws_stream, _) = connect_async(self.ws_url.as_str())
                .await
                .map_err(|e| format!("Failed to connect: {}", e))?;
            let (mut write, read) = ws_stream.split();

            let mut pending: HashMap<u64, EventKind> = HashMap::new();
            for (i, kind) in EventKind::ALL.iter().enumerate() {
                let id = i as u64 + 1;
                let request = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": "eth_subscribe",
                    "params": ["logs", {
                        "address": self.contract.to_string(),
                        "topics": [kind.topic().to_string()],
                    }],
                });
                write
                    .send(Message::Text(request.to_string()))
                    .await
                    .map_err(|e| format!("Failed to send: {}", e))?;
                pending.insert(id, *kind);
            }
            Ok::<_, String>((write, read, pending))
        };

        // A node that accepts TCP but never finishes the upgrade must not
        // hold up shutdown
        let (mut write, mut read, mut pending) = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            connected = tokio::time::timeout(CONNECT_TIMEOUT, connect) => connected
                .map_err(|_| format!("No handshake within {:?}", CONNECT_TIMEOUT))??,
        };

        let mut subscriptions: HashMap<String, EventKind> = HashMap::new();
        let mut refresh_owed = backoff.resumed();

        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => {
                    unsubscribe_all(&mut write, &subscriptions).await;
                    log::debug!("Released {} event subscriptions for {}", subscriptions.len(), account);
                    return Ok(());
                }
                next = read.next() => next,
            };

            let first = next
                .ok_or("Connection closed")?
                .map_err(|e| format!("Failed to receive: {}", e))?;
            let mut messages = vec![first];
            // Whatever is already buffered belongs to the same delivery batch
            while let Some(Some(more)) = read.next().now_or_never() {
                messages.push(more.map_err(|e| format!("Failed to receive: {}", e))?);
            }

            let mut batches: Vec<(EventKind, Vec<StakingEvent>)> = Vec::new();
            for message in messages {
                match message {
                    Message::Text(text) => {
                        handle_text(&text, &mut pending, &mut subscriptions, &mut batches)?;
                    }
                    Message::Ping(data) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| format!("Failed to send: {}", e))?;
                    }
                    Message::Close(_) => return Err("Connection closed by node".to_string()),
                    _ => {}
                }
            }

            if backoff.resumed() && subscriptions.len() == EventKind::ALL.len() {
                log::info!("Event subscriptions for {} restored", account);
                backoff.reset();
            }
            if refresh_owed && subscriptions.len() == EventKind::ALL.len() {
                refresh_owed = false;
                forward(sink, account, EventAction::RefreshAccount)?;
            }

            for (kind, events) in batches {
                for action in classify_batch(kind, &events, &account) {
                    log::debug!("{:?} x{} -> {:?}", kind, events.len(), action);
                    forward(sink, account, action)?;
                }
            }
        }
    }
}

fn forward(sink: &mpsc::UnboundedSender<EngineInput>, account: Address, action: EventAction) -> Result<(), String> {
    sink.send(EngineInput::Event { account, action })
        .map_err(|_| "Engine is no longer listening".to_string())
}

/// Route one text frame: a subscribe answer or a log notification
fn handle_text(
    text: &str,
    pending: &mut HashMap<u64, EventKind>,
    subscriptions: &mut HashMap<String, EventKind>,
    batches: &mut Vec<(EventKind, Vec<StakingEvent>)>,
) -> Result<(), String> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Ignoring non-JSON frame: {}", e);
            return Ok(());
        }
    };

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        if let Some(kind) = pending.remove(&id) {
            if let Some(error) = value.get("error") {
                return Err(format!("eth_subscribe for {:?} rejected: {}", kind, error));
            }
            let sub_id = value
                .get("result")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("eth_subscribe for {:?} returned no id", kind))?;
            subscriptions.insert(sub_id.to_string(), kind);
        }
        return Ok(());
    }

    if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return Ok(());
    }

    let params = &value["params"];
    let Some(kind) = params
        .get("subscription")
        .and_then(Value::as_str)
        .and_then(|s| subscriptions.get(s))
        .copied()
    else {
        return Ok(());
    };

    let decoded = RawLog::from_json(&params["result"]).and_then(|log| {
        if log.removed {
            Ok(None)
        } else {
            StakingEvent::decode(&log).map(Some)
        }
    });

    match decoded {
        Ok(Some(event)) => match batches.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, events)) => events.push(event),
            None => batches.push((kind, vec![event])),
        },
        Ok(None) => log::debug!("Skipping removed {:?} log", kind),
        Err(e) => log::warn!("Dropping undecodable {:?} log: {}", kind, e),
    }
    Ok(())
}

async fn unsubscribe_all<S>(write: &mut S, subscriptions: &HashMap<String, EventKind>)
where
    S: futures_util::Sink<Message> + Unpin,
{
    for (i, sub_id) in subscriptions.keys().enumerate() {
        let request = json!({
            "jsonrpc": "2.0",
            "id": UNSUBSCRIBE_ID_BASE + i as u64,
            "method": "eth_unsubscribe",
            "params": [sub_id],
        });
        if write.send(Message::Text(request.to_string())).await.is_err() {
            return;
        }
    }
    let _ = write.close().await;
}

fn backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

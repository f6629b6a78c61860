// Wallet session streaming
//
// Polls the signer node for the active account and chain and broadcasts
// changes to subscribers. This stream is independent of batch progress; the
// executor only consumes a point-in-time signer and network.
//
// Numan Thabit 2025 Nov

use crate::networks::NetworkId;
use crate::transport::jsonrpc::JsonRpc;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub account: Option<String>,
    pub network: Option<NetworkId>,
    /// Raw chain id, kept even when the network is unsupported
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    AccountChanged { account: Option<String> },
    NetworkChanged { chain_id: Option<u64> },
    Disconnected,
}

#[derive(Clone)]
pub struct SessionState {
    current: Arc<RwLock<SessionSnapshot>>,
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            current: Arc::new(RwLock::new(SessionSnapshot::default())),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.current.read().await.clone()
    }

    /// Record a fresh observation and broadcast what changed.
    pub async fn observe(&self, next: SessionSnapshot) -> Vec<SessionEvent> {
        let mut current = self.current.write().await;
        let mut events = Vec::new();
        if current.account != next.account {
            events.push(SessionEvent::AccountChanged {
                account: next.account.clone(),
            });
        }
        if current.chain_id != next.chain_id {
            events.push(SessionEvent::NetworkChanged {
                chain_id: next.chain_id,
            });
        }
        *current = next;
        drop(current);

        for event in &events {
            // no subscribers is fine
            let _ = self.tx.send(event.clone());
        }
        events
    }

    /// Clear the session after the node became unreachable.
    pub async fn disconnect(&self) -> bool {
        let mut current = self.current.write().await;
        if *current == SessionSnapshot::default() {
            return false;
        }
        *current = SessionSnapshot::default();
        drop(current);
        let _ = self.tx.send(SessionEvent::Disconnected);
        true
    }
}

async fn poll_once(rpc: &JsonRpc) -> Result<SessionSnapshot> {
    let chain_id = rpc.chain_id().await?;
    let account = rpc.accounts().await?.into_iter().next();
    Ok(SessionSnapshot {
        account: account.map(|a| a.to_ascii_lowercase()),
        network: NetworkId::from_chain_id(chain_id).ok(),
        chain_id: Some(chain_id),
    })
}

/// Start the session polling task.
pub fn start_session_watch(
    rpc: JsonRpc,
    state: SessionState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match poll_once(&rpc).await {
                Ok(snapshot) => {
                    for event in state.observe(snapshot).await {
                        info!(event = ?event, "wallet session changed");
                    }
                }
                Err(err) => {
                    if state.disconnect().await {
                        warn!(error = %err, "signer node unreachable; session disconnected");
                    } else {
                        debug!(error = %err, "signer node still unreachable");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_broadcasts_only_changes() {
        let state = SessionState::new(16);
        let mut rx = state.subscribe();

        let first = SessionSnapshot {
            account: Some("0xabc".into()),
            network: Some(NetworkId::Polygon),
            chain_id: Some(137),
        };
        let events = state.observe(first.clone()).await;
        assert_eq!(events.len(), 2);
        assert!(state.observe(first.clone()).await.is_empty());

        let switched = SessionSnapshot {
            network: Some(NetworkId::Optimism),
            chain_id: Some(10),
            ..first
        };
        assert_eq!(
            state.observe(switched).await,
            vec![SessionEvent::NetworkChanged { chain_id: Some(10) }]
        );

        assert!(state.disconnect().await);
        assert!(!state.disconnect().await);

        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 4);
        assert_eq!(received.last(), Some(&SessionEvent::Disconnected));
    }
}

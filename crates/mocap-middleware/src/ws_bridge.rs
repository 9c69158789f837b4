//! WebSocket bridge.
//!
//! [`WsBridge`] serves a lightweight WebSocket endpoint where external
//! clients (web dashboards, loggers, other robots) receive the live pose and
//! transform stream as JSON, one [`Event`] per text frame.
//!
//! Clients start out receiving everything.  Sending
//! `{"op":"subscribe","topic":"Rigid_Body_enu"}` narrows the stream to the
//! subscribed topics; `{"op":"unsubscribe",...}` removes one again.  Any other
//! text is ignored.
//!
//! The bridge is agnostic about the *meaning* of the data it routes; it only
//! handles serialisation and transport.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use mocap_types::{Event, MocapError};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;

/// Control messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ClientRequest {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Per-client topic filter.  Empty means "everything".
#[derive(Debug, Default)]
struct ClientFilter {
    topics: HashSet<String>,
}

impl ClientFilter {
    fn wants(&self, event: &Event) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic)
    }

    /// Apply a text frame from the client.  Returns `false` when the frame
    /// was not a recognised request.
    fn apply(&mut self, text: &str) -> bool {
        match serde_json::from_str::<ClientRequest>(text) {
            Ok(ClientRequest::Subscribe { topic }) => {
                self.topics.insert(topic);
                true
            }
            Ok(ClientRequest::Unsubscribe { topic }) => {
                self.topics.remove(&topic);
                true
            }
            Err(_) => false,
        }
    }
}

/// Bridge between the internal [`EventBus`] and WebSocket clients.
#[derive(Clone)]
pub struct WsBridge {
    bus: Arc<EventBus>,
}

impl WsBridge {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Bind `addr` and serve clients until a fatal bind error.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Channel`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), MocapError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MocapError::Channel(format!("ws bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Accept loop on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), MocapError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "ws bridge listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), MocapError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| MocapError::Channel(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe();
        let mut filter = ClientFilter::default();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if !filter.wants(&event) {
                                continue;
                            }
                            let json = serde_json::to_string(&event)
                                .map_err(|e| MocapError::Serialization(e.to_string()))?;
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            if !filter.apply(text.as_str()) {
                                debug!(peer = %peer, "ignoring unrecognised ws message");
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use mocap_types::{EventPayload, Header, Pose, PoseSink, PoseStamped};
    use tokio_tungstenite::connect_async;

    fn make_event(topic: &str) -> Event {
        Event::new(
            "test",
            topic,
            EventPayload::Pose(PoseStamped {
                header: Header {
                    stamp: DateTime::from_timestamp(0, 0).unwrap(),
                    frame_id: "world".to_string(),
                },
                pose: Pose::default(),
            }),
        )
    }

    #[test]
    fn empty_filter_wants_everything() {
        let filter = ClientFilter::default();
        assert!(filter.wants(&make_event("a_enu")));
        assert!(filter.wants(&make_event("/tf")));
    }

    #[test]
    fn subscribe_narrows_and_unsubscribe_widens() {
        let mut filter = ClientFilter::default();
        assert!(filter.apply(r#"{"op":"subscribe","topic":"a_enu"}"#));
        assert!(filter.wants(&make_event("a_enu")));
        assert!(!filter.wants(&make_event("a_ned")));

        assert!(filter.apply(r#"{"op":"unsubscribe","topic":"a_enu"}"#));
        assert!(filter.wants(&make_event("a_ned")));
    }

    #[test]
    fn unknown_messages_are_ignored() {
        let mut filter = ClientFilter::default();
        assert!(!filter.apply(r#"{"op":"publish","topic":"/cmd_vel"}"#));
        assert!(!filter.apply("not json"));
        assert!(filter.topics.is_empty());
    }

    #[tokio::test]
    async fn client_receives_subscribed_topic_as_json() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(EventBus::default());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(WsBridge::new(Arc::clone(&bus)).serve(listener));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await?;
        client
            .send(Message::Text(r#"{"op":"subscribe","topic":"b_enu"}"#.to_string().into()))
            .await?;

        // Keep publishing until the bridge has processed the subscription and
        // forwards the wanted topic.
        let received = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                bus.publish("a_enu", &make_pose())?;
                bus.publish("b_enu", &make_pose())?;
                if let Ok(Some(Ok(Message::Text(text)))) =
                    tokio::time::timeout(std::time::Duration::from_millis(50), client.next()).await
                {
                    let event: Event = serde_json::from_str(text.as_str())?;
                    if event.topic == "b_enu" {
                        return Ok::<Event, Box<dyn std::error::Error>>(event);
                    }
                }
            }
        })
        .await??;

        assert_eq!(received.topic, "b_enu");
        assert!(matches!(received.payload, EventPayload::Pose(_)));
        Ok(())
    }

    fn make_pose() -> PoseStamped {
        match make_event("x").payload {
            EventPayload::Pose(p) => p,
            EventPayload::Transform(_) => unreachable!(),
        }
    }
}

//! Headless, topic-keyed publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Publishing never blocks: a slow subscriber lags and loses the
//! oldest messages instead.
//!
//! # Topics
//!
//! Topics are free-form strings created on first use.  Pose handlers publish
//! on `<body>_enu` / `<body>_ned`; every transform broadcast goes to
//! [`TF_TOPIC`].  A firehose channel additionally carries every event on every
//! topic, for bridges that filter per client.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mocap_types::{Event, EventPayload, MocapError, PoseSink, PoseStamped, TransformSink, TransformStamped};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Topic every transform broadcast is published on.
pub const TF_TOPIC: &str = "/tf";

/// `source` stamped on events entering through the sink traits.
const SINK_SOURCE: &str = "mocap-middleware::sink";

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    firehose: broadcast::Sender<Event>,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus.  `capacity` applies to every channel independently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, like [`broadcast::channel`].
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            capacity,
            firehose,
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish `event` on `event.topic` and on the firehose.
    ///
    /// Returns the number of receivers that were handed the event.  `Ok(0)`
    /// when nobody is listening; that is a normal condition, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Channel`] for an empty topic name or a poisoned
    /// topic table.
    pub fn publish_to(&self, event: Event) -> Result<usize, MocapError> {
        if event.topic.is_empty() {
            return Err(MocapError::Channel("refusing to publish on an empty topic".to_string()));
        }

        let topic_sender = {
            let topics = self
                .topics
                .read()
                .map_err(|e| MocapError::Channel(format!("topic table poisoned: {e}")))?;
            topics.get(&event.topic).cloned()
        };

        let mut delivered = 0;
        if let Some(sender) = topic_sender {
            // SendError only means there are no receivers right now.
            delivered += sender.send(event.clone()).unwrap_or(0);
        }
        delivered += self.firehose.send(event).unwrap_or(0);
        Ok(delivered)
    }

    /// Subscribe to a single topic, creating its channel if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Channel`] when the topic table is poisoned.
    pub fn subscribe_to(&self, topic: &str) -> Result<TopicReceiver, MocapError> {
        let mut topics = self
            .topics
            .write()
            .map_err(|e| MocapError::Channel(format!("topic table poisoned: {e}")))?;
        let sender = topics.entry(topic.to_string()).or_insert_with(|| {
            debug!(topic, "creating topic channel");
            broadcast::channel(self.capacity).0
        });
        Ok(TopicReceiver {
            topic: topic.to_string(),
            receiver: sender.subscribe(),
        })
    }

    /// Subscribe to every event on every topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.firehose.subscribe()
    }

    /// Names of the topics that currently have a channel, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.topics.read() {
            Ok(topics) => topics.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PoseSink for EventBus {
    fn publish(&self, topic: &str, pose: &PoseStamped) -> Result<(), MocapError> {
        self.publish_to(Event::new(SINK_SOURCE, topic, EventPayload::Pose(pose.clone())))
            .map(|_| ())
    }
}

impl TransformSink for EventBus {
    fn broadcast(&self, transform: &TransformStamped) -> Result<(), MocapError> {
        self.publish_to(Event::new(
            SINK_SOURCE,
            TF_TOPIC,
            EventPayload::Transform(transform.clone()),
        ))
        .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns `None` once the bus is gone.  Lagging is logged and skipped
    /// over: pose streams only care about the newest sample.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is
    /// queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

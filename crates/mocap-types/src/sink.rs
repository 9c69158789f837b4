//! Output sink traits.
//!
//! The pose handler only ever talks to these traits, so the transport behind
//! them (the in-process event bus, a frame graph, a test recorder) can be
//! swapped without touching the conversion logic.

use std::sync::Arc;

use crate::{MocapError, PoseStamped, TransformStamped};

/// A topic-keyed message transport for pose samples.
pub trait PoseSink: Send + Sync {
    /// Publish `pose` on `topic`.  Fire-and-forget: there is no
    /// acknowledgement channel.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Sink`] or [`MocapError::Channel`] when the
    /// transport refuses the message.
    fn publish(&self, topic: &str, pose: &PoseStamped) -> Result<(), MocapError>;
}

/// A transform-broadcast sink keyed by parent/child frame identifiers.
pub trait TransformSink: Send + Sync {
    /// Broadcast the parent → child transform carried by `transform`.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Sink`] or [`MocapError::Channel`] when the
    /// broadcast cannot be delivered.
    fn broadcast(&self, transform: &TransformStamped) -> Result<(), MocapError>;
}

/// Broadcasts every transform to several sinks in order.
///
/// Every sink is tried even when an earlier one fails; the first error is
/// returned afterwards.
#[derive(Clone, Default)]
pub struct TransformFanout {
    sinks: Vec<Arc<dyn TransformSink>>,
}

impl TransformFanout {
    pub fn new(sinks: Vec<Arc<dyn TransformSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TransformSink for TransformFanout {
    fn broadcast(&self, transform: &TransformStamped) -> Result<(), MocapError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.broadcast(transform) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TransformFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformFanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

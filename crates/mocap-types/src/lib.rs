//! `mocap-types` – shared vocabulary of the MoCap bridge.
//!
//! Geometry primitives, the ROS-shaped pose/transform messages, the raw
//! tracker sample, the event envelope routed over the bus, the output sink
//! traits and the global error type.

pub mod geometry;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{Quaternion, Vec3};
pub use sink::{PoseSink, TransformFanout, TransformSink};

/// System-wide timestamp attached to every outgoing message.
pub type Timestamp = DateTime<Utc>;

/// Source-local time of a tracker report, as a `timeval` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SourceTime {
    pub sec: i64,
    pub usec: u32,
}

impl SourceTime {
    pub const fn new(sec: i64, usec: u32) -> Self {
        Self { sec, usec }
    }

    /// Interpret the value as Unix time.  `None` when out of chrono's range
    /// or when `usec` is not a valid sub-second count.
    pub fn to_datetime(self) -> Option<Timestamp> {
        if self.usec >= 1_000_000 {
            return None;
        }
        DateTime::from_timestamp(self.sec, self.usec * 1_000)
    }
}

/// One report from the tracking service, in its native NUE axes
/// (X = right, Y = up, Z = forward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub position: Vec3,
    pub orientation: Quaternion,
    pub source_time: SourceTime,
}

// ────────────────────────────────────────────────────────────────────────────
// Messages
// ────────────────────────────────────────────────────────────────────────────

/// Timestamp and reference frame of a stamped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Timestamp,
    pub frame_id: String,
}

/// Position and orientation in free space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

/// A pose with a timestamp and the frame it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

/// Rigid transform between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

/// `header.frame_id` is the parent frame; `child_frame_id` the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform,
}

impl TransformStamped {
    /// Re-frame a pose as the transform from its frame to `child_frame_id`.
    pub fn from_pose(pose: &PoseStamped, child_frame_id: impl Into<String>) -> Self {
        Self {
            header: pose.header.clone(),
            child_frame_id: child_frame_id.into(),
            transform: Transform {
                translation: pose.pose.position,
                rotation: pose.pose.orientation,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the pose bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Wall-clock time the event entered the bus.
    pub timestamp: DateTime<Utc>,
    /// e.g., "mocap-middleware::bus"
    pub source: String,
    pub topic: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            topic: topic.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "msg", rename_all = "snake_case")]
pub enum EventPayload {
    Pose(PoseStamped),
    Transform(TransformStamped),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning construction, registration, transport and
/// decoding failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MocapError {
    #[error("Invalid tracker name {0:?}: sanitises to an empty topic name")]
    InvalidName(String),

    #[error("Registration of {session_key} refused: {reason}")]
    Registration { session_key: String, reason: String },

    #[error("Sink {sink} failed: {details}")]
    Sink { sink: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

//! Transform Frame (TF) engine.
//!
//! Maintains a directed graph of named reference frames and the rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Given any
//! two frame names the engine composes a chain of transforms via BFS.
//!
//! [`TfBuffer`] wraps the engine behind a mutex and implements
//! [`TransformSink`], so every transform a pose handler broadcasts can be
//! resolved in-process.
//!
//! # Example
//!
//! ```rust
//! use mocap_frames::transform::{TfEngine, Transform3D};
//! use mocap_types::{Quaternion, Vec3};
//!
//! let mut tf = TfEngine::new();
//! tf.set_transform("world", "Rigid Body",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_transform("Rigid Body", "marker",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("world", "marker").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use mocap_types::{MocapError, Quaternion, Timestamp, Transform, TransformSink, TransformStamped, Vec3};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        Self::new(translated, self.rotation * other.rotation)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn apply(self, point: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(point))
    }
}

impl From<Transform> for Transform3D {
    fn from(t: Transform) -> Self {
        Self::new(t.translation, t.rotation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// A directed graph of named reference frames and the [`Transform3D`]s that
/// relate them.
///
/// Edges are directional: adding `"A" → "B"` does not create the inverse.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child] = Transform3D`
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Compose the transform that maps points in `target_frame` into
    /// `source_frame`, following parent → child edges.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        if source_frame == target_frame {
            return Some(Transform3D::identity());
        }

        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();

        queue.push_back((source_frame, Transform3D::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(children) = self.edges.get(current) else {
                continue;
            };
            for (next, edge_tf) in children {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated.compose(*edge_tf);
                if next == target_frame {
                    return Some(composed);
                }
                queue.push_back((next.as_str(), composed));
            }
        }

        None
    }

    /// Number of parent → child edges currently held.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BufferState {
    engine: TfEngine,
    /// Stamp of the latest broadcast per child frame.
    stamps: HashMap<String, Timestamp>,
}

/// Thread-safe latest-value frame graph fed by transform broadcasts.
#[derive(Debug, Default)]
pub struct TfBuffer {
    state: Mutex<BufferState>,
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`TfEngine::lookup`].  `None` also when the buffer is poisoned.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        let state = self.state.lock().ok()?;
        state.engine.lookup(source_frame, target_frame)
    }

    /// Stamp of the most recent transform broadcast into `child_frame`.
    pub fn latest_stamp(&self, child_frame: &str) -> Option<Timestamp> {
        let state = self.state.lock().ok()?;
        state.stamps.get(child_frame).copied()
    }
}

impl TransformSink for TfBuffer {
    fn broadcast(&self, transform: &TransformStamped) -> Result<(), MocapError> {
        let mut state = self.state.lock().map_err(|e| MocapError::Sink {
            sink: "tf_buffer".to_string(),
            details: e.to_string(),
        })?;
        state.engine.set_transform(
            &transform.header.frame_id,
            &transform.child_frame_id,
            transform.transform.into(),
        );
        state
            .stamps
            .insert(transform.child_frame_id.clone(), transform.header.stamp);
        trace!(
            parent = %transform.header.frame_id,
            child = %transform.child_frame_id,
            "transform buffered"
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

//! [`TrackerHandler`] – per-body frame converter and dispatcher.
//!
//! One handler exists per tracked rigid body.  On construction it registers a
//! callback with the [`TrackerConnection`] under `<name>@<host>`.  For every
//! report the callback:
//!
//! 1. resolves the report time through the handler's own
//!    [`TimestampResolver`] stream;
//! 2. relabels the native position into ENU and NED axes and re-expresses the
//!    native body orientation in both conventions;
//! 3. emits, in this order, the ENU pose, the ENU transform, the NED pose and
//!    the NED transform.
//!
//! All four emissions carry the same stamp.  A failing sink is logged and
//! skipped; the remaining emissions still go out and nothing is reported back
//! to the connection.
//!
//! | Output | Topic | Parent frame | Child frame |
//! |---|---|---|---|
//! | ENU | `<sanitised>_enu` | `options.frame` | `<name>` |
//! | NED | `<sanitised>_ned` | `options.ned_frame` | `<name>_ned` |

use std::sync::Arc;

use mocap_frames::Convention;
use mocap_types::{
    Header, MocapError, Pose, PoseSink, PoseStamped, RawSample, Timestamp, TransformSink,
    TransformStamped,
};
use tracing::{debug, info, warn};

use crate::connection::{TrackerConnection, session_key};
use crate::time::TimestampResolver;

/// Construction-time configuration of a [`TrackerHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerHandlerOptions {
    /// Tracking service endpoint; part of the session key.
    pub host: String,
    /// Parent frame of ENU output.
    pub frame: String,
    /// Parent frame of NED output.
    pub ned_frame: String,
    /// Renormalise incoming orientations before the frame change.  Off by
    /// default: quaternions are passed through exactly as reported.
    pub normalize_orientation: bool,
}

impl Default for TrackerHandlerOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            frame: "world".to_string(),
            ned_frame: "world_ned".to_string(),
            normalize_orientation: false,
        }
    }
}

/// Make a tracker name safe for use in a topic name.
///
/// ASCII alphanumerics and `/` are kept, `_` is kept unless it is the first
/// character, spaces become `_`, anything else is dropped.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .filter_map(|(i, c)| match c {
            c if c.is_ascii_alphanumeric() || c == '/' => Some(c),
            '_' if i > 0 => Some('_'),
            ' ' => Some('_'),
            _ => None,
        })
        .collect()
}

/// Names derived from the tracked body's raw name.  Fixed for the lifetime
/// of the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerIdentity {
    name: String,
    topic_name: String,
    session_key: String,
    enu_topic: String,
    ned_topic: String,
    child_frame: String,
    child_frame_ned: String,
}

impl HandlerIdentity {
    /// # Errors
    ///
    /// Returns [`MocapError::InvalidName`] when `name` sanitises to nothing.
    pub fn new(name: &str, host: &str) -> Result<Self, MocapError> {
        let topic_name = sanitize_name(name);
        if topic_name.is_empty() {
            return Err(MocapError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            enu_topic: format!("{topic_name}{}", Convention::Enu.topic_suffix()),
            ned_topic: format!("{topic_name}{}", Convention::Ned.topic_suffix()),
            child_frame: name.to_string(),
            child_frame_ned: format!("{name}_ned"),
            session_key: session_key(name, host),
            topic_name,
        })
    }

    /// Raw tracker name, as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sanitised name; prefix of both topics.
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// `<name>@<host>`.
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn topic(&self, convention: Convention) -> &str {
        match convention {
            Convention::Enu => &self.enu_topic,
            Convention::Ned => &self.ned_topic,
        }
    }

    pub fn child_frame(&self, convention: Convention) -> &str {
        match convention {
            Convention::Enu => &self.child_frame,
            Convention::Ned => &self.child_frame_ned,
        }
    }
}

/// The part of a handler the connection's callback holds on to.
struct PoseDispatcher {
    identity: HandlerIdentity,
    options: TrackerHandlerOptions,
    time: Arc<dyn TimestampResolver>,
    poses: Arc<dyn PoseSink>,
    transforms: Arc<dyn TransformSink>,
}

impl PoseDispatcher {
    fn parent_frame(&self, convention: Convention) -> &str {
        match convention {
            Convention::Enu => &self.options.frame,
            Convention::Ned => &self.options.ned_frame,
        }
    }

    fn convert(&self, sample: &RawSample, stamp: Timestamp, convention: Convention) -> PoseStamped {
        let body = if self.options.normalize_orientation {
            sample.orientation.normalize()
        } else {
            sample.orientation
        };
        PoseStamped {
            header: Header {
                stamp,
                frame_id: self.parent_frame(convention).to_string(),
            },
            pose: Pose {
                position: convention.remap_position(sample.position),
                orientation: convention.remap_orientation(body),
            },
        }
    }

    fn position_callback(&self, sample: &RawSample) {
        let stamp = self.time.resolve_timestamp(sample.source_time);

        for convention in Convention::ALL {
            let pose = self.convert(sample, stamp, convention);

            let topic = self.identity.topic(convention);
            if let Err(e) = self.poses.publish(topic, &pose) {
                warn!(topic, error = %e, "pose publish failed");
            }
            self.send_transform(&pose, self.identity.child_frame(convention));
        }
    }

    fn send_transform(&self, pose: &PoseStamped, child_frame: &str) {
        let tf = TransformStamped::from_pose(pose, child_frame);
        if let Err(e) = self.transforms.broadcast(&tf) {
            warn!(
                parent = %tf.header.frame_id,
                child = child_frame,
                error = %e,
                "transform broadcast failed"
            );
        }
    }
}

/// Republishes one tracked body in ENU and NED.
///
/// Dropping the handler deregisters it from the connection.
pub struct TrackerHandler {
    dispatcher: Arc<PoseDispatcher>,
    connection: Arc<TrackerConnection>,
}

impl TrackerHandler {
    /// Build the handler for body `name` and register it with `connection`.
    ///
    /// # Errors
    ///
    /// * [`MocapError::InvalidName`] – `name` sanitises to an empty topic.
    /// * [`MocapError::Registration`] – the connection refused the session
    ///   key, e.g. another handler already tracks `name` on `options.host`.
    pub fn new(
        name: &str,
        options: TrackerHandlerOptions,
        connection: Arc<TrackerConnection>,
        time: Arc<dyn TimestampResolver>,
        poses: Arc<dyn PoseSink>,
        transforms: Arc<dyn TransformSink>,
    ) -> Result<Self, MocapError> {
        let identity = HandlerIdentity::new(name, &options.host)?;
        let dispatcher = Arc::new(PoseDispatcher {
            identity,
            options,
            time,
            poses,
            transforms,
        });

        let callback_target = Arc::clone(&dispatcher);
        connection.register_handler(&dispatcher.identity.session_key, move |sample: &RawSample| {
            callback_target.position_callback(sample)
        })?;

        info!(
            session_key = %dispatcher.identity.session_key,
            enu_topic = dispatcher.identity.topic(Convention::Enu),
            ned_topic = dispatcher.identity.topic(Convention::Ned),
            "tracker handler registered"
        );
        Ok(Self {
            dispatcher,
            connection,
        })
    }

    pub fn identity(&self) -> &HandlerIdentity {
        &self.dispatcher.identity
    }

    pub fn options(&self) -> &TrackerHandlerOptions {
        &self.dispatcher.options
    }

    /// Process one sample directly, exactly as a connection callback would.
    pub fn handle_sample(&self, sample: &RawSample) {
        self.dispatcher.position_callback(sample);
    }

    /// Convert `sample` into `convention` with an already resolved stamp.
    /// Pure: nothing is emitted.
    pub fn convert(&self, sample: &RawSample, stamp: Timestamp, convention: Convention) -> PoseStamped {
        self.dispatcher.convert(sample, stamp, convention)
    }
}

impl Drop for TrackerHandler {
    fn drop(&mut self) {
        let key = &self.dispatcher.identity.session_key;
        if self.connection.deregister(key) {
            debug!(session_key = %key, "tracker handler dropped");
        }
    }
}

impl std::fmt::Debug for TrackerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerHandler")
            .field("identity", &self.dispatcher.identity)
            .field("options", &self.dispatcher.options)
            .finish()
    }
}

//! [`TrackerConnection`] – session to the tracking service and sample
//! callback registry.
//!
//! Each tracked body is addressed by a session key `<name>@<host>`, the same
//! string the tracking service stamps on its reports.  Handlers register a
//! callback under their key; the connection invokes it synchronously, on the
//! delivering thread, for every report addressed to that key.
//!
//! The connection owns only the callbacks, never the handlers.  A handler
//! deregisters itself when dropped, so the connection cannot call into a
//! handler that no longer exists.
//!
//! # Wire format
//!
//! [`TrackerConnection::ingest_datagram`] decodes one JSON report per
//! datagram:
//!
//! ```json
//! {"sender": "Rigid Body@opti1", "pos": [0.0, 1.0, 0.0],
//!  "quat": [0.0, 0.0, 0.0, 1.0], "sec": 1700000000, "usec": 250000}
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mocap_types::{MocapError, Quaternion, RawSample, SourceTime, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Callback invoked once per delivered sample.
pub type SampleCallback = Arc<dyn Fn(&RawSample) + Send + Sync>;

/// Build the session key for tracked body `name` on `host`.
pub fn session_key(name: &str, host: &str) -> String {
    format!("{name}@{host}")
}

/// One pose report as sent by the tracking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerReport {
    /// Session key of the reporting body, `<name>@<host>`.
    pub sender: String,
    /// Position, native axes.
    pub pos: [f64; 3],
    /// Orientation `[x, y, z, w]`, native axes.
    pub quat: [f64; 4],
    pub sec: i64,
    #[serde(default)]
    pub usec: u32,
}

impl TrackerReport {
    pub fn sample(&self) -> RawSample {
        RawSample {
            position: Vec3::from(self.pos),
            orientation: Quaternion::from(self.quat),
            source_time: SourceTime::new(self.sec, self.usec),
        }
    }
}

/// Session to one tracking service endpoint.
#[derive(Default)]
pub struct TrackerConnection {
    handlers: RwLock<HashMap<String, SampleCallback>>,
}

impl TrackerConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for reports addressed to `session_key`.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Registration`] when the key is empty, already
    /// taken, or the registry is poisoned.
    pub fn register_handler<F>(&self, session_key: &str, callback: F) -> Result<(), MocapError>
    where
        F: Fn(&RawSample) + Send + Sync + 'static,
    {
        let refuse = |reason: String| MocapError::Registration {
            session_key: session_key.to_string(),
            reason,
        };

        if session_key.is_empty() {
            return Err(refuse("empty session key".to_string()));
        }

        let mut handlers = self
            .handlers
            .write()
            .map_err(|e| refuse(format!("handler registry poisoned: {e}")))?;
        if handlers.contains_key(session_key) {
            return Err(refuse("duplicate session key".to_string()));
        }
        handlers.insert(session_key.to_string(), Arc::new(callback));
        debug!(session_key, "handler registered");
        Ok(())
    }

    /// Remove the callback for `session_key`.  Returns whether one existed.
    pub fn deregister(&self, session_key: &str) -> bool {
        let removed = match self.handlers.write() {
            Ok(mut handlers) => handlers.remove(session_key).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(session_key).is_some(),
        };
        if removed {
            debug!(session_key, "handler deregistered");
        }
        removed
    }

    pub fn is_registered(&self, session_key: &str) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(session_key))
            .unwrap_or(false)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Deliver `sample` to the handler registered under `session_key`.
    ///
    /// The callback runs after the registry lock is released, so it may
    /// itself register or deregister handlers.  Returns `false` when no
    /// handler is registered for the key.
    pub fn dispatch(&self, session_key: &str, sample: &RawSample) -> bool {
        let callback = match self.handlers.read() {
            Ok(handlers) => handlers.get(session_key).cloned(),
            Err(_) => None,
        };
        match callback {
            Some(callback) => {
                callback(sample);
                true
            }
            None => {
                trace!(session_key, "no handler for report");
                false
            }
        }
    }

    /// Decode one JSON [`TrackerReport`] and dispatch it.
    ///
    /// Returns whether a handler received the sample.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Serialization`] for a malformed datagram.
    pub fn ingest_datagram(&self, datagram: &[u8]) -> Result<bool, MocapError> {
        let report: TrackerReport =
            serde_json::from_slice(datagram).map_err(|e| MocapError::Serialization(e.to_string()))?;
        Ok(self.dispatch(&report.sender, &report.sample()))
    }
}

impl std::fmt::Debug for TrackerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        f.debug_struct("TrackerConnection")
            .field("handlers", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sample(x: f64) -> RawSample {
        RawSample {
            position: Vec3::new(x, 0.0, 0.0),
            orientation: Quaternion::identity(),
            source_time: SourceTime::new(1, 0),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<RawSample>>>, impl Fn(&RawSample) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: &RawSample| sink.lock().unwrap().push(*s))
    }

    #[test]
    fn session_key_joins_name_and_host() {
        assert_eq!(session_key("Rigid Body", "opti1"), "Rigid Body@opti1");
    }

    #[test]
    fn dispatch_reaches_registered_handler_in_order() {
        let conn = TrackerConnection::new();
        let (seen, cb) = recorder();
        conn.register_handler("a@h", cb).unwrap();

        assert!(conn.dispatch("a@h", &sample(1.0)));
        assert!(conn.dispatch("a@h", &sample(2.0)));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].position.x, 1.0);
        assert_eq!(seen[1].position.x, 2.0);
    }

    #[test]
    fn dispatch_to_unknown_key_returns_false() {
        let conn = TrackerConnection::new();
        assert!(!conn.dispatch("ghost@h", &sample(0.0)));
    }

    #[test]
    fn duplicate_session_key_is_refused() {
        let conn = TrackerConnection::new();
        conn.register_handler("a@h", |_: &RawSample| {}).unwrap();
        let err = conn.register_handler("a@h", |_: &RawSample| {}).unwrap_err();
        assert!(matches!(err, MocapError::Registration { ref session_key, .. } if session_key == "a@h"));
        assert_eq!(conn.handler_count(), 1);
    }

    #[test]
    fn empty_session_key_is_refused() {
        let conn = TrackerConnection::new();
        assert!(conn.register_handler("", |_: &RawSample| {}).is_err());
    }

    #[test]
    fn deregister_stops_delivery() {
        let conn = TrackerConnection::new();
        let (seen, cb) = recorder();
        conn.register_handler("a@h", cb).unwrap();
        assert!(conn.deregister("a@h"));
        assert!(!conn.deregister("a@h"));
        assert!(!conn.is_registered("a@h"));
        assert!(!conn.dispatch("a@h", &sample(1.0)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn callback_may_touch_registry() {
        let conn = Arc::new(TrackerConnection::new());
        let inner = Arc::clone(&conn);
        conn.register_handler("a@h", move |_: &RawSample| {
            inner.register_handler("b@h", |_: &RawSample| {}).unwrap();
        })
        .unwrap();

        assert!(conn.dispatch("a@h", &sample(0.0)));
        assert!(conn.is_registered("b@h"));
        // Break the Arc cycle between the connection and the callback.
        conn.deregister("a@h");
    }

    #[test]
    fn ingest_datagram_decodes_and_dispatches() {
        let conn = TrackerConnection::new();
        let (seen, cb) = recorder();
        conn.register_handler("Rigid Body@opti1", cb).unwrap();

        let datagram = br#"{"sender":"Rigid Body@opti1","pos":[0.0,1.0,0.0],"quat":[0.0,0.0,0.0,1.0],"sec":1700000000,"usec":250000}"#;
        assert!(conn.ingest_datagram(datagram).unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(seen[0].orientation, Quaternion::identity());
        assert_eq!(seen[0].source_time, SourceTime::new(1_700_000_000, 250_000));
    }

    #[test]
    fn ingest_datagram_defaults_usec() {
        let report: TrackerReport =
            serde_json::from_str(r#"{"sender":"a@h","pos":[1,2,3],"quat":[0,0,0,1],"sec":5}"#).unwrap();
        assert_eq!(report.sample().source_time, SourceTime::new(5, 0));
    }

    #[test]
    fn ingest_datagram_for_unknown_sender_is_not_an_error() {
        let conn = TrackerConnection::new();
        let datagram = br#"{"sender":"x@h","pos":[0,0,0],"quat":[0,0,0,1],"sec":0}"#;
        assert!(!conn.ingest_datagram(datagram).unwrap());
    }

    #[test]
    fn malformed_datagram_is_a_serialization_error() {
        let conn = TrackerConnection::new();
        let result = conn.ingest_datagram(b"{\"sender\":\"a@h\",\"pos\":[1,2]}");
        assert!(matches!(result, Err(MocapError::Serialization(_))));
    }

    #[test]
    fn debug_lists_session_keys() {
        let conn = TrackerConnection::new();
        conn.register_handler("b@h", |_: &RawSample| {}).unwrap();
        conn.register_handler("a@h", |_: &RawSample| {}).unwrap();
        let dbg = format!("{conn:?}");
        assert!(dbg.contains("[\"a@h\", \"b@h\"]"), "{dbg}");
    }
}

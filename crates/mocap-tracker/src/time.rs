//! [`TimeManager`] – timestamp resolution for tracker reports.
//!
//! Reports carry the tracking host's own clock.  Before a report is
//! republished its time has to be expressed on this machine's clock.  Three
//! policies are available:
//!
//! | Policy | Stamp |
//! |---|---|
//! | [`TimePolicy::Source`] | the report time, read as Unix time |
//! | [`TimePolicy::Arrival`] | this machine's wall clock at resolution |
//! | [`TimePolicy::Offset`] | report time + an offset fitted on the first report |
//!
//! The offset is re-fitted whenever the fitted stamp strays from the local
//! clock by more than the resync threshold (tracking host rebooted, clock
//! stepped).  One [`TimeManager`] serves a whole tracking host, since every
//! body shares its clock.
//!
//! Each report stream resolves through its own [`TimeStream`], obtained with
//! [`TimeManager::stream`].  Stamps never go backwards within a stream;
//! streams do not constrain each other.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{TimeDelta, Utc};
use mocap_types::{SourceTime, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Converts a source-local report time into a system timestamp.
pub trait TimestampResolver: Send + Sync {
    /// Must be non-decreasing for increasing `source_time` within a stream.
    fn resolve_timestamp(&self, source_time: SourceTime) -> Timestamp;
}

/// How [`TimeManager`] maps report times onto the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePolicy {
    Source,
    Arrival,
    #[default]
    Offset,
}

impl std::fmt::Display for TimePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimePolicy::Source => write!(f, "source"),
            TimePolicy::Arrival => write!(f, "arrival"),
            TimePolicy::Offset => write!(f, "offset"),
        }
    }
}

/// Default drift tolerated before the offset is re-fitted.
fn default_resync_threshold() -> TimeDelta {
    TimeDelta::seconds(1)
}

type Clock = Box<dyn Fn() -> Timestamp + Send + Sync>;

/// Source → local clock mapping shared by every stream of one tracking host.
pub struct TimeManager {
    policy: TimePolicy,
    resync_threshold: TimeDelta,
    clock: Clock,
    offset: Mutex<Option<TimeDelta>>,
}

impl TimeManager {
    /// Resolver reading the system wall clock.
    pub fn new(policy: TimePolicy) -> Self {
        Self::with_clock(policy, Utc::now)
    }

    /// Resolver reading `clock` instead of the system wall clock.
    pub fn with_clock(policy: TimePolicy, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        Self {
            policy,
            resync_threshold: default_resync_threshold(),
            clock: Box::new(clock),
            offset: Mutex::new(None),
        }
    }

    pub fn with_resync_threshold(mut self, threshold: TimeDelta) -> Self {
        self.resync_threshold = threshold;
        self
    }

    pub fn policy(&self) -> TimePolicy {
        self.policy
    }

    /// Currently fitted source → local offset, if any.
    pub fn offset(&self) -> Option<TimeDelta> {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A new report stream resolving through this manager.
    pub fn stream(self: &Arc<Self>) -> TimeStream {
        TimeStream {
            manager: Arc::clone(self),
            last: Mutex::new(None),
        }
    }

    /// Express `source_time` on the local clock.  Not clamped: see
    /// [`TimeStream`] for the per-stream ordering guarantee.
    pub fn local_time(&self, source_time: SourceTime) -> Timestamp {
        let now = (self.clock)();
        match (self.policy, source_time.to_datetime()) {
            (TimePolicy::Arrival, _) => now,
            (TimePolicy::Source, Some(source)) => source,
            (TimePolicy::Offset, Some(source)) => self.fitted(source, now),
            (_, None) => {
                warn!(sec = source_time.sec, usec = source_time.usec, "unrepresentable source time; using arrival time");
                now
            }
        }
    }

    fn fitted(&self, source: Timestamp, now: Timestamp) -> Timestamp {
        let mut current = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(offset) = *current
            && let Some(stamp) = source.checked_add_signed(offset)
            && (stamp - now).abs() <= self.resync_threshold
        {
            return stamp;
        }

        let offset = now - source;
        match *current {
            Some(previous) => debug!(
                previous_ms = previous.num_milliseconds(),
                offset_ms = offset.num_milliseconds(),
                "re-fitting source clock offset"
            ),
            None => debug!(offset_ms = offset.num_milliseconds(), "fitted source clock offset"),
        }
        *current = Some(offset);
        now
    }
}

impl std::fmt::Debug for TimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeManager")
            .field("policy", &self.policy)
            .field("resync_threshold", &self.resync_threshold)
            .field("offset", &self.offset())
            .finish()
    }
}

/// Timestamp resolver for one report stream (one tracked body).
///
/// Shares the offset of its [`TimeManager`] and keeps its own last stamp, so
/// its output never goes backwards.
#[derive(Debug)]
pub struct TimeStream {
    manager: Arc<TimeManager>,
    last: Mutex<Option<Timestamp>>,
}

impl TimeStream {
    pub fn manager(&self) -> &Arc<TimeManager> {
        &self.manager
    }
}

impl TimestampResolver for TimeStream {
    fn resolve_timestamp(&self, source_time: SourceTime) -> Timestamp {
        let raw = self.manager.local_time(source_time);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            Some(previous) if raw < previous => previous,
            _ => raw,
        };
        *last = Some(stamp);
        stamp
    }
}

//! `mocap-tracker` – tracker ingest and pose republishing.
//!
//! # Modules
//!
//! - [`connection`] – [`TrackerConnection`][connection::TrackerConnection]:
//!   the session to the tracking service.  Owns the registry of per-body
//!   sample callbacks and decodes incoming tracker reports.
//! - [`time`] – [`TimeManager`][time::TimeManager] and per-body
//!   [`TimeStream`][time::TimeStream]: turn source-local report
//!   times into system timestamps.
//! - [`handler`] – [`TrackerHandler`][handler::TrackerHandler]: converts each
//!   native sample into ENU and NED poses and fans them out to the pose and
//!   transform sinks.

pub mod connection;
pub mod handler;
pub mod time;

pub use connection::{TrackerConnection, TrackerReport, session_key};
pub use handler::{HandlerIdentity, TrackerHandler, TrackerHandlerOptions, sanitize_name};
pub use time::{TimeManager, TimePolicy, TimeStream, TimestampResolver};

//! `mocap-middleware` – pose transport.
//!
//! Routes converted poses and transforms from the tracker handlers to
//! whoever listens, without caring about the geometry they carry.
//!
//! # Modules
//!
//! - [`bus`] – topic-keyed publish/subscribe event bus built on Tokio
//!   broadcast channels.  Implements both output sink traits.
//! - [`ws_bridge`] – WebSocket endpoint that streams bus traffic to external
//!   clients as JSON, with per-client topic filtering.

pub mod bus;
pub mod ws_bridge;

pub use bus::{EventBus, TF_TOPIC, TopicReceiver};
pub use ws_bridge::WsBridge;

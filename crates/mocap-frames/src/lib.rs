//! `mocap-frames` – axis conventions and rigid transforms.
//!
//! # Modules
//!
//! - [`convention`] – the tracking system's native NUE axes and the two
//!   navigation conventions (ENU, NED) poses are republished in, with the
//!   fixed rotations between them.
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: directed graph of
//!   named frames and the transforms relating them, and
//!   [`TfBuffer`][transform::TfBuffer], a shareable transform sink built on
//!   it.

pub mod convention;
pub mod transform;

pub use convention::{Convention, FixedRotations};
pub use transform::{TfBuffer, TfEngine, Transform3D};

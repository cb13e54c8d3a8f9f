//! Tracking adapter.
//!
//! The harness does not identify LEDs or solve poses itself. It registers
//! sensors with a `TrackingEngine`, feeds it frame pairs, and forwards the
//! poses it resolves to a `PoseSink`.

mod adapter;
mod engine;
mod engines;
mod identifier;
mod pose;

pub use adapter::{Dispatch, SensorRegistration, TrackingAdapter};
pub use engine::{EngineReport, TrackingEngine};
pub use engines::StubEngine;
pub use identifier::{IdentifierFactory, LedIdentifier, SlotIdentifier, SlotIdentifierFactory};
pub use pose::{Pose, SensorPose};

//! Adapters for the external key-value / pub-sub bus.
//!
//! The bus carries four surfaces: the settings and vehicle hashes we watch,
//! the alarm and bmx hashes we publish, the `bmx:interrupt` channel, and the
//! actuation list queues (`scooter:horn`, `scooter:blinker`, `scooter:alarm`).
//! Hash writes follow the notify convention of the other on-vehicle
//! services: HSET the field, then PUBLISH the field name on the hash's
//! channel so watchers re-read exactly what changed.

pub mod client;
pub mod publisher;
pub mod subscriber;

pub use client::Bus;
pub use publisher::{BusActuator, InterruptPublisher, StatusPublisher};
pub use subscriber::Subscriber;

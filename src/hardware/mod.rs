//! BMX055 hardware access.
//!
//! The sensor is reached over plain SMBus byte transfers; the kernel's own
//! IIO drivers are unbound at start-up so this process owns the bus devices.
//! Drivers are generic over [`i2c::RegisterBus`] so register programming can
//! be verified against a fake register map without hardware.

pub mod accel;
pub mod gyro;
pub mod i2c;
pub mod poller;
pub mod registers;
pub mod unbind;

pub use accel::Accelerometer;
pub use gyro::Gyroscope;
pub use i2c::{RegisterBus, SmbusDevice};
pub use poller::{InterruptPoller, InterruptSink, PollerHandle};

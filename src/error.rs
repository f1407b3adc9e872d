use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Start-up paths treat `HardwareInit`, `Bus`, and `Inhibitor` as fatal;
/// everything else is logged and survived.
#[derive(Debug, Error)]
pub enum Error {
    /// Chip identification or initial power-mode programming failed.
    #[error("hardware init failed: {0}")]
    HardwareInit(String),

    /// SMBus transfer failed during steady-state operation.
    #[error("i2c error: {0}")]
    I2c(#[from] i2cdev::linux::LinuxI2CError),

    /// Key-value bus operation failed.
    #[error("bus error: {0}")]
    Bus(#[from] redis::RedisError),

    /// Suspend-inhibitor service call failed.
    #[error("inhibitor error: {0}")]
    Inhibitor(#[from] zbus::Error),

    /// Malformed command received on the external intake queue.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! SMBus byte access behind a narrow trait.
//!
//! The BMX055 only ever needs single-register byte reads and writes, so the
//! bus surface is exactly that. Production uses [`SmbusDevice`] on a Linux
//! i2c-dev node; tests substitute an in-memory register map.

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::error::Result;

/// Byte-register access to one I2C slave.
pub trait RegisterBus: Send {
    fn read_reg(&mut self, reg: u8) -> Result<u8>;
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()>;
}

/// An open i2c-dev node bound to a single slave address.
pub struct SmbusDevice {
    dev: LinuxI2CDevice,
}

impl SmbusDevice {
    /// Open `path` and bind the slave address. The kernel driver for the
    /// address must already be unbound or the ioctl fails with EBUSY.
    pub fn open(path: &str, addr: u16) -> Result<Self> {
        let dev = LinuxI2CDevice::new(path, addr)?;
        Ok(Self { dev })
    }
}

impl RegisterBus for SmbusDevice {
    fn read_reg(&mut self, reg: u8) -> Result<u8> {
        Ok(self.dev.smbus_read_byte_data(reg)?)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        Ok(self.dev.smbus_write_byte_data(reg, value)?)
    }
}

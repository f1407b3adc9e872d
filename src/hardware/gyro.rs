//! BMX055 gyroscope driver.
//!
//! The gyroscope takes no part in motion detection; it is initialised so the
//! die is in a known power state and reset together with the accelerometer
//! between alarm phases.

use crate::error::{Error, Result};
use crate::hardware::i2c::RegisterBus;
use crate::hardware::registers as reg;

#[derive(Debug)]
pub struct Gyroscope<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Gyroscope<B> {
    /// Verify the chip ID and bring the die into normal power mode.
    pub fn new(mut bus: B) -> Result<Self> {
        let chip_id = bus
            .read_reg(reg::GYRO_CHIP_ID)
            .map_err(|e| Error::HardwareInit(format!("gyro chip ID read: {e}")))?;

        if chip_id != reg::GYRO_CHIP_ID_VALUE {
            return Err(Error::HardwareInit(format!(
                "unexpected gyroscope chip ID 0x{chip_id:02X} (want 0x0F)"
            )));
        }

        bus.write_reg(reg::GYRO_LPM1, 0x00)
            .map_err(|e| Error::HardwareInit(format!("gyro power mode: {e}")))?;

        Ok(Self { bus })
    }

    /// Restart the die; see the accelerometer note about the 10 ms reboot.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.bus.write_reg(reg::GYRO_SOFTRESET, reg::SOFT_RESET_CMD)
    }
}

//! BMX055 accelerometer driver.
//!
//! Covers exactly the slow/no-motion interrupt machinery the alarm uses:
//! threshold/duration programming, pin routing and latching, enable/disable,
//! status and latch-clear, soft reset. All register effects are bit-exact
//! against the BMC150 register map.

use crate::error::{Error, Result};
use crate::hardware::i2c::RegisterBus;
use crate::hardware::registers as reg;
use crate::tracing::prelude::*;

#[derive(Debug)]
pub struct Accelerometer<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Accelerometer<B> {
    /// Verify the chip ID and bring the die into normal power mode.
    pub fn new(mut bus: B) -> Result<Self> {
        let chip_id = bus
            .read_reg(reg::ACCEL_CHIP_ID)
            .map_err(|e| Error::HardwareInit(format!("accel chip ID read: {e}")))?;

        if !reg::ACCEL_CHIP_ID_VALUES.contains(&chip_id) {
            return Err(Error::HardwareInit(format!(
                "unexpected accelerometer chip ID 0x{chip_id:02X} (want 0xFA or 0xFB)"
            )));
        }

        bus.write_reg(reg::ACCEL_PMU_LPW, 0x00)
            .map_err(|e| Error::HardwareInit(format!("accel power mode: {e}")))?;

        debug!(chip_id = %format_args!("0x{chip_id:02X}"), "accelerometer up");
        Ok(Self { bus })
    }

    /// Program the slow/no-motion threshold and sample-count duration.
    pub fn configure_slow_no_motion(&mut self, threshold: u8, duration: u8) -> Result<()> {
        self.bus.write_reg(reg::ACCEL_SLO_NO_MOT_DUR, duration)?;
        self.bus.write_reg(reg::ACCEL_SLO_NO_MOT_THR, threshold)?;
        Ok(())
    }

    /// Configure the electrical behaviour of INT1 or INT2: push-pull,
    /// active-high, and the requested latch mode.
    pub fn configure_interrupt_pin(&mut self, use_int2: bool, latched: bool) -> Result<()> {
        let mut out_ctrl = self.bus.read_reg(reg::ACCEL_INT_OUT_CTRL)?;

        if use_int2 {
            out_ctrl |= reg::INT2_ACTIVE_HIGH;
            out_ctrl &= !reg::INT2_OPEN_DRAIN;
        } else {
            out_ctrl |= reg::INT1_ACTIVE_HIGH;
            out_ctrl &= !reg::INT1_OPEN_DRAIN;
        }

        self.bus.write_reg(reg::ACCEL_INT_OUT_CTRL, out_ctrl)?;

        let latch = if latched {
            reg::INT_LATCHED
        } else {
            reg::INT_NON_LATCHED
        };
        self.bus.write_reg(reg::ACCEL_INT_LATCH, latch)?;

        Ok(())
    }

    /// Route the slow/no-motion interrupt to the selected pin.
    pub fn map_interrupt_to_pin(&mut self, use_int2: bool) -> Result<()> {
        let map_reg = if use_int2 {
            reg::ACCEL_INT_MAP_2
        } else {
            reg::ACCEL_INT_MAP_0
        };
        self.bus.write_reg(map_reg, reg::MAP_SLOW_NO_MOTION)
    }

    /// Clear the slow/no-motion routing on both pins.
    pub fn disable_interrupt_mapping(&mut self) -> Result<()> {
        self.bus.write_reg(reg::ACCEL_INT_MAP_0, 0x00)?;
        self.bus.write_reg(reg::ACCEL_INT_MAP_2, 0x00)?;
        Ok(())
    }

    /// Enable the detector on all three axes. With `slow_motion` false the
    /// SEL bit is set, switching the engine to its no-motion variant.
    pub fn enable_slow_no_motion_interrupt(&mut self, slow_motion: bool) -> Result<()> {
        let mut int_en = reg::SLO_NO_MOT_EN_X | reg::SLO_NO_MOT_EN_Y | reg::SLO_NO_MOT_EN_Z;
        if !slow_motion {
            int_en |= reg::SLO_NO_MOT_SEL;
        }
        self.bus.write_reg(reg::ACCEL_INT_EN_2, int_en)
    }

    pub fn disable_slow_no_motion_interrupt(&mut self) -> Result<()> {
        self.bus.write_reg(reg::ACCEL_INT_EN_2, 0x00)
    }

    /// Whether the latched slow/no-motion interrupt is pending.
    pub fn interrupt_status(&mut self) -> Result<bool> {
        let status = self.bus.read_reg(reg::ACCEL_INT_STATUS_0)?;
        Ok(status & reg::INT_STATUS_SLOW_NO_MOT != 0)
    }

    pub fn clear_latched_interrupt(&mut self) -> Result<()> {
        self.bus.write_reg(reg::ACCEL_INT_LATCH, reg::INT_RESET_LATCH)
    }

    /// Restart the die. The caller must allow ~10 ms before the next
    /// command; the part ignores the bus while rebooting.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.bus.write_reg(reg::ACCEL_SOFTRESET, reg::SOFT_RESET_CMD)
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

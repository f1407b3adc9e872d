//! BMX055 register map, restricted to what the alarm daemon touches.
//!
//! The accelerometer is a BMC150-style core, the gyroscope a BMG160. Only
//! the slow/no-motion interrupt path of the accelerometer and the reset
//! registers are used; data-output registers are deliberately absent.

/// I2C slave addresses of the three BMX055 dies.
pub const ACCEL_ADDR: u16 = 0x18;
pub const GYRO_ADDR: u16 = 0x68;

/// Accelerometer chip ID register and its accepted values.
pub const ACCEL_CHIP_ID: u8 = 0x00;
pub const ACCEL_CHIP_ID_VALUES: [u8; 2] = [0xFA, 0xFB];

/// Power mode / low-power control. 0x00 selects normal mode.
pub const ACCEL_PMU_LPW: u8 = 0x11;

/// Soft-reset register; writing [`SOFT_RESET_CMD`] restarts the die.
pub const ACCEL_SOFTRESET: u8 = 0x14;

/// Interrupt enable group 2: slow/no-motion per-axis enables and the
/// select bit choosing the no-motion variant.
pub const ACCEL_INT_EN_2: u8 = 0x18;
pub const SLO_NO_MOT_EN_X: u8 = 0x01;
pub const SLO_NO_MOT_EN_Y: u8 = 0x02;
pub const SLO_NO_MOT_EN_Z: u8 = 0x04;
pub const SLO_NO_MOT_SEL: u8 = 0x08;

/// Interrupt-to-pin mapping registers (INT1 / INT2) and the slow/no-motion
/// map bit, identical in both.
pub const ACCEL_INT_MAP_0: u8 = 0x19;
pub const ACCEL_INT_MAP_2: u8 = 0x1B;
pub const MAP_SLOW_NO_MOTION: u8 = 0x08;

/// Electrical behaviour of the interrupt pins.
pub const ACCEL_INT_OUT_CTRL: u8 = 0x20;
pub const INT1_ACTIVE_HIGH: u8 = 0x01;
pub const INT1_OPEN_DRAIN: u8 = 0x02;
pub const INT2_ACTIVE_HIGH: u8 = 0x04;
pub const INT2_OPEN_DRAIN: u8 = 0x08;

/// Latch configuration; the same address doubles as the latch-reset
/// register when bit 0x80 is written.
pub const ACCEL_INT_LATCH: u8 = 0x21;
pub const INT_NON_LATCHED: u8 = 0x00;
pub const INT_LATCHED: u8 = 0x0F;
pub const INT_RESET_LATCH: u8 = 0x80;

/// Interrupt status group 0 and the slow/no-motion flag inside it.
pub const ACCEL_INT_STATUS_0: u8 = 0x09;
pub const INT_STATUS_SLOW_NO_MOT: u8 = 0x08;

/// Slow/no-motion duration (sample count N-1) and threshold (3.91 mg/LSB
/// in the 2 g range).
pub const ACCEL_SLO_NO_MOT_DUR: u8 = 0x27;
pub const ACCEL_SLO_NO_MOT_THR: u8 = 0x29;

/// Gyroscope chip ID register and its expected value.
pub const GYRO_CHIP_ID: u8 = 0x00;
pub const GYRO_CHIP_ID_VALUE: u8 = 0x0F;

/// Gyroscope low-power mode 1; 0x00 selects normal mode.
pub const GYRO_LPM1: u8 = 0x11;

/// Gyroscope soft-reset register.
pub const GYRO_SOFTRESET: u8 = 0x14;

/// Value written to either soft-reset register to restart the die. The part
/// needs about 10 ms before it accepts further commands.
pub const SOFT_RESET_CMD: u8 = 0xB6;

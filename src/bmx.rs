//! Translates logical motion-sensor commands into driver calls.
//!
//! The state machine never touches registers; it speaks in sensitivity
//! profiles and interrupt pins. This controller owns the mapping onto the
//! BMX055 drivers and gates the interrupt poller so the two can never
//! disagree about whether motion events should flow.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::fsm::MotionControl;
use crate::hardware::accel::Accelerometer;
use crate::hardware::gyro::Gyroscope;
use crate::hardware::i2c::RegisterBus;
use crate::hardware::poller::PollerHandle;
use crate::tracing::prelude::*;

/// Time the dies need after a soft reset before accepting commands.
const RESET_SETTLE: Duration = Duration::from_millis(10);

/// Motion-detection sensitivity profile.
///
/// Thresholds are in units of 3.91 mg per LSB in the 2 g range, tuned on the
/// vehicle: Low ignores small bumps (~63 mg), Medium balances road noise
/// (~35 mg), High picks up subtle movement (~31 mg). Duration 0x01 demands
/// two consecutive samples over threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl Sensitivity {
    pub fn threshold(self) -> u8 {
        match self {
            Sensitivity::Low => 0x10,
            Sensitivity::Medium => 0x09,
            Sensitivity::High => 0x08,
        }
    }

    pub fn duration(self) -> u8 {
        0x01
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        };
        f.write_str(s)
    }
}

/// Which physical pin the slow/no-motion interrupt is routed to.
/// INT2 is the one wired on the target board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptPin {
    None,
    Int1,
    Int2,
}

impl fmt::Display for InterruptPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterruptPin::None => "none",
            InterruptPin::Int1 => "int1",
            InterruptPin::Int2 => "int2",
        };
        f.write_str(s)
    }
}

pub struct BmxController<B: RegisterBus> {
    accel: Arc<Mutex<Accelerometer<B>>>,
    gyro: Arc<Mutex<Gyroscope<B>>>,
    poller: PollerHandle,
}

impl<B: RegisterBus> BmxController<B> {
    pub fn new(
        accel: Arc<Mutex<Accelerometer<B>>>,
        gyro: Arc<Mutex<Gyroscope<B>>>,
        poller: PollerHandle,
    ) -> Self {
        Self {
            accel,
            gyro,
            poller,
        }
    }
}

#[async_trait]
impl<B: RegisterBus + 'static> MotionControl for BmxController<B> {
    async fn set_sensitivity(&self, sensitivity: Sensitivity) -> Result<()> {
        info!(
            %sensitivity,
            threshold = sensitivity.threshold(),
            duration = sensitivity.duration(),
            "setting sensitivity"
        );

        self.accel
            .lock()
            .unwrap()
            .configure_slow_no_motion(sensitivity.threshold(), sensitivity.duration())
    }

    async fn set_interrupt_pin(&self, pin: InterruptPin) -> Result<()> {
        info!(%pin, "setting interrupt pin");

        let mut accel = self.accel.lock().unwrap();
        match pin {
            InterruptPin::None => accel.disable_interrupt_mapping(),
            InterruptPin::Int1 | InterruptPin::Int2 => {
                let use_int2 = pin == InterruptPin::Int2;
                accel.configure_interrupt_pin(use_int2, true)?;
                accel.map_interrupt_to_pin(use_int2)
            }
        }
    }

    /// Reset both dies. Each reset is attempted even if the other fails;
    /// the first failure is reported after the settle delay.
    async fn soft_reset(&self) -> Result<()> {
        debug!("soft reset");

        let accel_result = self.accel.lock().unwrap().soft_reset();
        let gyro_result = self.gyro.lock().unwrap().soft_reset();

        tokio::time::sleep(RESET_SETTLE).await;

        if let Err(e) = &accel_result {
            error!(error = %e, "accelerometer soft reset failed");
        }
        if let Err(e) = &gyro_result {
            error!(error = %e, "gyroscope soft reset failed");
        }

        accel_result.and(gyro_result)
    }

    async fn enable_interrupt(&self) -> Result<()> {
        info!("enabling motion interrupt");

        self.accel
            .lock()
            .unwrap()
            .enable_slow_no_motion_interrupt(true)?;

        // Only a successfully armed sensor is worth polling.
        self.poller.enable();
        Ok(())
    }

    async fn disable_interrupt(&self) -> Result<()> {
        info!("disabling motion interrupt");

        // Gate first: the poller must be quiet even when the hardware
        // write below fails.
        self.poller.disable().await;

        self.accel
            .lock()
            .unwrap()
            .disable_slow_no_motion_interrupt()
    }
}

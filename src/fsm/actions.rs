//! Entry and exit actions for each alarm state.
//!
//! The hardware is reprogrammed between phases because the chip's single
//! slow/no-motion detector is reused with a different sensitivity profile at
//! each escalation step. Failed side effects are logged and never block a
//! transition; the machine is driven by events alone.

use std::time::Duration;

use super::machine::{StateMachine, Timer, CHIP_SETUP, DELAY_ARMED, LEVEL1_CHECK, LEVEL2_CHECK, WAITING_MOVEMENT};
use super::{AlarmState, Event};
use crate::bmx::{InterruptPin, Sensitivity};
use crate::tracing::prelude::*;

impl StateMachine {
    pub(super) async fn enter_state(&mut self, state: AlarmState) {
        match state {
            AlarmState::Init => self.enter_init().await,
            AlarmState::WaitingEnabled => self.enter_waiting_enabled().await,
            AlarmState::Disarmed => self.enter_disarmed().await,
            AlarmState::DelayArmed => self.enter_delay_armed().await,
            AlarmState::Armed => self.enter_armed().await,
            AlarmState::TriggerL1Wait => self.enter_trigger_l1_wait().await,
            AlarmState::TriggerL1 => self.enter_trigger_l1().await,
            AlarmState::TriggerL2 => self.enter_trigger_l2().await,
            AlarmState::WaitingMovement => self.enter_waiting_movement().await,
            AlarmState::SeatboxAccess => self.enter_seatbox_access().await,
        }
    }

    pub(super) async fn exit_state(&mut self, state: AlarmState) {
        match state {
            AlarmState::DelayArmed => self.stop_timer(Timer::DelayArmed),
            AlarmState::TriggerL1Wait => {
                self.stop_timer(Timer::Level1Cooldown);
                self.stop_output().await;
            }
            AlarmState::TriggerL1 => self.stop_timer(Timer::Level1Check),
            AlarmState::TriggerL2 => {
                self.stop_timer(Timer::Level2Check);
                self.stop_output().await;
            }
            AlarmState::WaitingMovement => {
                self.stop_timer(Timer::ChipSetup);
                self.stop_timer(Timer::WaitingMovement);
                self.stop_output().await;
            }
            AlarmState::SeatboxAccess => {
                info!("leaving seatbox access");
                self.release_inhibitor().await;
            }
            _ => {}
        }
    }

    async fn enter_init(&mut self) {
        info!("entering init state");
        self.configure_bmx(InterruptPin::Int2, Sensitivity::Low).await;
    }

    async fn enter_waiting_enabled(&mut self) {
        info!("entering waiting_enabled state");

        self.reset_sensor().await;
        self.disable_motion_interrupt().await;
        self.configure_bmx(InterruptPin::Int2, Sensitivity::Low).await;
        self.release_inhibitor().await;
        self.ctx.level2_cycles = 0;
    }

    async fn enter_disarmed(&mut self) {
        info!("entering disarmed state");

        self.reset_sensor().await;
        self.disable_motion_interrupt().await;
        self.configure_bmx(InterruptPin::None, Sensitivity::Low).await;
        self.release_inhibitor().await;
        self.ctx.level2_cycles = 0;
    }

    async fn enter_delay_armed(&mut self) {
        info!(delay = ?DELAY_ARMED, "entering delay_armed state");

        self.acquire_inhibitor("Arming alarm").await;
        self.reset_sensor().await;
        self.configure_bmx(InterruptPin::Int2, Sensitivity::Low).await;

        self.start_timer(Timer::DelayArmed, DELAY_ARMED, Event::DelayArmedTimer);
        self.ctx.level2_cycles = 0;
    }

    async fn enter_armed(&mut self) {
        info!("entering armed state");

        self.release_inhibitor().await;
        self.configure_bmx(InterruptPin::None, Sensitivity::Medium).await;
        self.enable_motion_interrupt().await;
    }

    async fn enter_trigger_l1_wait(&mut self) {
        let cooldown = Duration::from_secs(self.ctx.l1_cooldown_secs.into());
        info!(?cooldown, "entering trigger_level_1_wait state");

        self.acquire_inhibitor("Level 1 cooldown").await;
        self.reset_sensor().await;

        // First visible reaction: one hazard blink.
        if let Err(e) = self.output.blink_hazards().await {
            error!(error = %e, "failed to blink hazards");
        }

        if self.ctx.hair_trigger_enabled {
            let burst = Duration::from_secs(self.ctx.hair_trigger_duration_secs.into());
            info!(duration = ?burst, "hair trigger active, starting short alarm");
            if let Err(e) = self.output.start(burst).await {
                error!(error = %e, "failed to start hair-trigger alarm");
            }
        }

        self.start_timer(Timer::Level1Cooldown, cooldown, Event::Level1CooldownTimer);
    }

    async fn enter_trigger_l1(&mut self) {
        info!(check = ?LEVEL1_CHECK, "entering trigger_level_1 state");

        self.configure_bmx(InterruptPin::None, Sensitivity::Medium).await;
        self.enable_motion_interrupt().await;

        self.start_timer(Timer::Level1Check, LEVEL1_CHECK, Event::Level1CheckTimer);
    }

    async fn enter_trigger_l2(&mut self) {
        info!("entering trigger_level_2 state");

        self.acquire_inhibitor("Level 2 triggered").await;
        self.reset_sensor().await;

        let duration = Duration::from_secs(self.ctx.alarm_duration_secs.into());
        if let Err(e) = self.output.start(duration).await {
            error!(error = %e, "failed to start alarm output");
        }

        self.start_timer(Timer::Level2Check, LEVEL2_CHECK, Event::Level2CheckTimer);
    }

    async fn enter_waiting_movement(&mut self) {
        info!(
            window = ?WAITING_MOVEMENT,
            cycle = self.ctx.level2_cycles,
            "entering waiting_movement state"
        );

        self.reset_sensor().await;

        let duration = Duration::from_secs(self.ctx.alarm_duration_secs.into());
        if let Err(e) = self.output.start(duration).await {
            error!(error = %e, "failed to start alarm output");
        }

        self.start_timer(Timer::ChipSetup, CHIP_SETUP, Event::ChipSetupTimer);
        self.start_timer(Timer::WaitingMovement, WAITING_MOVEMENT, Event::Level2CheckTimer);
    }

    async fn enter_seatbox_access(&mut self) {
        info!(
            previous = %self.ctx.pre_seatbox_state,
            lock_closed = self.ctx.seatbox_lock_closed,
            "entering seatbox_access state"
        );

        self.acquire_inhibitor("Seatbox access").await;
        self.reset_sensor().await;
        self.disable_motion_interrupt().await;
        self.configure_bmx(InterruptPin::None, Sensitivity::Low).await;
    }

    pub(super) async fn configure_bmx(&self, pin: InterruptPin, sensitivity: Sensitivity) {
        if let Err(e) = self.motion.set_interrupt_pin(pin).await {
            error!(%pin, error = %e, "failed to set interrupt pin");
        }
        if let Err(e) = self.motion.set_sensitivity(sensitivity).await {
            error!(%sensitivity, error = %e, "failed to set sensitivity");
        }
        info!(%pin, %sensitivity, "configured motion sensor");
    }

    async fn reset_sensor(&self) {
        if let Err(e) = self.motion.soft_reset().await {
            error!(error = %e, "failed to soft reset motion sensor");
        }
    }

    async fn enable_motion_interrupt(&self) {
        if let Err(e) = self.motion.enable_interrupt().await {
            error!(error = %e, "failed to enable interrupt");
        }
    }

    async fn disable_motion_interrupt(&self) {
        if let Err(e) = self.motion.disable_interrupt().await {
            error!(error = %e, "failed to disable interrupt");
        }
    }

    async fn acquire_inhibitor(&self, reason: &str) {
        if let Err(e) = self.inhibitor.acquire(reason).await {
            error!(reason, error = %e, "failed to acquire suspend inhibitor");
        }
    }

    async fn release_inhibitor(&self) {
        if let Err(e) = self.inhibitor.release().await {
            error!(error = %e, "failed to release suspend inhibitor");
        }
    }

    async fn stop_output(&self) {
        if let Err(e) = self.output.stop().await {
            error!(error = %e, "failed to stop alarm output");
        }
    }
}

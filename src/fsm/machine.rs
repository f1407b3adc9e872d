//! The alarm state machine event loop and transition function.
//!
//! Single-threaded: the loop is the only mutator of alarm context. Timers
//! are spawned sleep-then-send tasks held in a per-name table, so exiting a
//! state cancels everything it armed with one abort per name, and a timer's
//! only side effect is an event the loop itself consumes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{self, Event, EventSender};
use super::{AlarmOutput, AlarmState, MotionControl, StatusSink, SuspendInhibit};
use crate::config::Config;
use crate::tracing::prelude::*;

/// An armed vehicle keeps punishing a persistent intruder for at most this
/// many level-2 cycles before giving up and disarming.
pub(super) const MAX_LEVEL2_CYCLES: u32 = 4;

pub(super) const DELAY_ARMED: Duration = Duration::from_secs(5);
pub(super) const LEVEL1_CHECK: Duration = Duration::from_secs(5);
pub(super) const LEVEL2_CHECK: Duration = Duration::from_secs(50);
/// Fires 3 s before the waiting-movement window closes so the sensor is
/// live for the window's tail.
pub(super) const CHIP_SETUP: Duration = Duration::from_secs(47);
pub(super) const WAITING_MOVEMENT: Duration = Duration::from_secs(50);

/// Logical timer names. At most one timer exists per name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Timer {
    DelayArmed,
    Level1Cooldown,
    Level1Check,
    Level2Check,
    ChipSetup,
    WaitingMovement,
}

/// Alarm context owned exclusively by the machine.
pub(super) struct Context {
    pub alarm_enabled: bool,
    pub vehicle_stand_by: bool,
    pub level2_cycles: u32,
    pub alarm_duration_secs: u32,
    pub hair_trigger_enabled: bool,
    pub hair_trigger_duration_secs: u32,
    pub l1_cooldown_secs: u32,
    pub pre_seatbox_state: AlarmState,
    pub seatbox_lock_closed: bool,
}

pub struct StateMachine {
    pub(super) state: AlarmState,
    pub(super) ctx: Context,
    events_tx: EventSender,
    events_rx: mpsc::Receiver<Event>,
    pub(super) motion: Arc<dyn MotionControl>,
    pub(super) status: Arc<dyn StatusSink>,
    pub(super) inhibitor: Arc<dyn SuspendInhibit>,
    pub(super) output: Arc<dyn AlarmOutput>,
    timers: HashMap<Timer, JoinHandle<()>>,
}

impl StateMachine {
    pub fn new(
        motion: Arc<dyn MotionControl>,
        status: Arc<dyn StatusSink>,
        inhibitor: Arc<dyn SuspendInhibit>,
        output: Arc<dyn AlarmOutput>,
        config: &Config,
    ) -> Self {
        let (events_tx, events_rx) = events::channel();

        Self {
            state: AlarmState::Init,
            ctx: Context {
                alarm_enabled: false,
                vehicle_stand_by: false,
                level2_cycles: 0,
                alarm_duration_secs: config.alarm_duration_secs,
                hair_trigger_enabled: config.hair_trigger,
                hair_trigger_duration_secs: config.hair_trigger_duration_secs,
                l1_cooldown_secs: config.l1_cooldown_secs,
                pre_seatbox_state: AlarmState::Init,
                seatbox_lock_closed: true,
            },
            events_tx,
            events_rx,
            motion,
            status,
            inhibitor,
            output,
            timers: HashMap::new(),
        }
    }

    /// Handle for producers; clones freely.
    pub fn events(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Run the initial state's entry actions before the loop starts, so
    /// the sensor sits in the safe (INT2, Low) configuration while
    /// start-up sync settles the real state.
    pub async fn bootstrap(&mut self) {
        self.enter_state(AlarmState::Init).await;
    }

    /// Run until cancelled, then release every held resource.
    pub async fn run(mut self, cancellation: CancellationToken) {
        info!("state machine started");

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("state machine stopped");
                    self.teardown().await;
                    return;
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn teardown(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        if let Err(e) = self.output.stop().await {
            warn!(error = %e, "failed to stop alarm output on shutdown");
        }
        if let Err(e) = self.inhibitor.release().await {
            warn!(error = %e, "failed to release inhibitor on shutdown");
        }
    }

    pub(super) async fn handle_event(&mut self, event: Event) {
        // Settings that steer behaviour without being part of the state
        // space update context and return.
        match event {
            Event::HornSettingChanged(enabled) => {
                self.output.set_horn_enabled(enabled);
                return;
            }
            Event::AlarmDurationChanged(duration) => {
                self.ctx.alarm_duration_secs = duration;
                info!(duration, "alarm duration updated");
                return;
            }
            Event::HairTriggerChanged(enabled) => {
                self.ctx.hair_trigger_enabled = enabled;
                info!(enabled, "hair trigger setting updated");
                return;
            }
            Event::HairTriggerDurationChanged(duration) => {
                self.ctx.hair_trigger_duration_secs = duration;
                info!(duration, "hair trigger duration updated");
                return;
            }
            Event::ChipSetupTimer => {
                self.rearm_for_window_tail().await;
                return;
            }
            _ => {}
        }

        let old_state = self.state;
        debug!(event = event.name(), state = %old_state, "handling event");

        let new_state = self.transition(&event);

        // A punished-again intruder re-enters WaitingMovement: the siren and
        // both window timers restart even though the state name is unchanged.
        let reenter = old_state == AlarmState::WaitingMovement
            && new_state == AlarmState::WaitingMovement
            && matches!(event, Event::MajorMovement);

        if new_state == old_state && !reenter {
            return;
        }

        // Motion confirmed during the level-1 check window gets a hazard
        // blink on the edge, before the level-2 siren starts.
        if old_state == AlarmState::TriggerL1
            && new_state == AlarmState::TriggerL2
            && matches!(event, Event::BmxInterrupt { .. } | Event::MajorMovement)
        {
            info!("movement confirmed during level 1, blinking hazards");
            if let Err(e) = self.output.blink_hazards().await {
                error!(error = %e, "failed to blink hazards");
            }
        }

        self.exit_state(old_state).await;
        self.state = new_state;
        info!(from = %old_state, to = %new_state, event = event.name(), "state transition");
        self.enter_state(new_state).await;
        self.publish_status().await;
    }

    /// The 47 s mark of the waiting-movement window: put the sensor at its
    /// highest sensitivity and re-enable the interrupt so the final 3 s can
    /// observe a still-moving vehicle.
    async fn rearm_for_window_tail(&mut self) {
        if self.state != AlarmState::WaitingMovement {
            return;
        }

        self.configure_bmx(crate::bmx::InterruptPin::None, crate::bmx::Sensitivity::High)
            .await;
        if let Err(e) = self.motion.enable_interrupt().await {
            error!(error = %e, "failed to enable interrupt");
        }
    }

    /// Pure resolution of (state, event, context) to the next state.
    /// Context flags are updated here; side effects belong to entry/exit.
    fn transition(&mut self, event: &Event) -> AlarmState {
        use AlarmState::*;

        match self.state {
            Init => match event {
                Event::VehicleStateChanged(vs) => {
                    self.ctx.vehicle_stand_by = vs.is_stand_by();
                    Init
                }
                Event::AlarmModeChanged(enabled) => {
                    self.ctx.alarm_enabled = *enabled;
                    Init
                }
                Event::InitComplete => {
                    if self.ctx.alarm_enabled {
                        if self.ctx.vehicle_stand_by {
                            DelayArmed
                        } else {
                            Disarmed
                        }
                    } else {
                        WaitingEnabled
                    }
                }
                _ => Init,
            },

            WaitingEnabled => match event {
                Event::AlarmModeChanged(true) => {
                    self.ctx.alarm_enabled = true;
                    if self.ctx.vehicle_stand_by {
                        DelayArmed
                    } else {
                        Disarmed
                    }
                }
                Event::VehicleStateChanged(vs) => {
                    self.ctx.vehicle_stand_by = vs.is_stand_by();
                    WaitingEnabled
                }
                _ => WaitingEnabled,
            },

            Disarmed => match event {
                Event::VehicleStateChanged(vs) => {
                    self.ctx.vehicle_stand_by = vs.is_stand_by();
                    if self.ctx.vehicle_stand_by {
                        DelayArmed
                    } else {
                        Disarmed
                    }
                }
                Event::AlarmModeChanged(false) => {
                    self.ctx.alarm_enabled = false;
                    WaitingEnabled
                }
                _ => Disarmed,
            },

            DelayArmed => match event {
                Event::DelayArmedTimer => Armed,
                Event::UnauthorizedSeatbox => TriggerL2,
                _ => self.armed_class_exit(event).unwrap_or(DelayArmed),
            },

            Armed => match event {
                Event::SeatboxOpened => {
                    self.ctx.pre_seatbox_state = Armed;
                    self.ctx.seatbox_lock_closed = false;
                    SeatboxAccess
                }
                Event::UnauthorizedSeatbox => TriggerL2,
                Event::BmxInterrupt { .. } | Event::MinorMovement => TriggerL1Wait,
                Event::ManualTrigger { .. } => TriggerL2,
                _ => self.armed_class_exit(event).unwrap_or(Armed),
            },

            TriggerL1Wait => match event {
                Event::SeatboxOpened => {
                    self.ctx.pre_seatbox_state = TriggerL1Wait;
                    self.ctx.seatbox_lock_closed = false;
                    SeatboxAccess
                }
                Event::UnauthorizedSeatbox => TriggerL2,
                Event::Level1CooldownTimer => TriggerL1,
                _ => self.armed_class_exit(event).unwrap_or(TriggerL1Wait),
            },

            TriggerL1 => match event {
                Event::SeatboxOpened => {
                    self.ctx.pre_seatbox_state = TriggerL1;
                    self.ctx.seatbox_lock_closed = false;
                    SeatboxAccess
                }
                Event::UnauthorizedSeatbox => TriggerL2,
                Event::Level1CheckTimer => DelayArmed,
                Event::BmxInterrupt { .. } | Event::MajorMovement => TriggerL2,
                _ => self.armed_class_exit(event).unwrap_or(TriggerL1),
            },

            TriggerL2 => match event {
                Event::Level2CheckTimer => {
                    if self.ctx.level2_cycles >= MAX_LEVEL2_CYCLES {
                        Disarmed
                    } else {
                        WaitingMovement
                    }
                }
                _ => self.armed_class_exit(event).unwrap_or(TriggerL2),
            },

            WaitingMovement => match event {
                Event::Level2CheckTimer => DelayArmed,
                Event::MajorMovement => {
                    self.ctx.level2_cycles += 1;
                    if self.ctx.level2_cycles >= MAX_LEVEL2_CYCLES {
                        Disarmed
                    } else {
                        // Re-enter: the siren and both window timers restart.
                        WaitingMovement
                    }
                }
                _ => self.armed_class_exit(event).unwrap_or(WaitingMovement),
            },

            SeatboxAccess => match event {
                Event::SeatboxClosed => {
                    self.ctx.seatbox_lock_closed = true;
                    DelayArmed
                }
                _ => self.armed_class_exit(event).unwrap_or(SeatboxAccess),
            },
        }
    }

    /// Exits shared by every armed-class state: switching the alarm off
    /// always parks in WaitingEnabled, leaving stand-by always disarms.
    fn armed_class_exit(&mut self, event: &Event) -> Option<AlarmState> {
        match event {
            Event::AlarmModeChanged(false) => {
                self.ctx.alarm_enabled = false;
                Some(AlarmState::WaitingEnabled)
            }
            Event::AlarmModeChanged(true) => {
                self.ctx.alarm_enabled = true;
                None
            }
            Event::VehicleStateChanged(vs) => {
                self.ctx.vehicle_stand_by = vs.is_stand_by();
                if self.ctx.vehicle_stand_by {
                    None
                } else {
                    Some(AlarmState::Disarmed)
                }
            }
            _ => None,
        }
    }

    pub(super) async fn publish_status(&self) {
        let status = self.state.status();
        if let Err(e) = self.status.publish_status(status).await {
            error!(error = %e, status, "failed to publish status");
        }
    }

    pub(super) fn start_timer(&mut self, timer: Timer, after: Duration, event: Event) {
        self.stop_timer(timer);

        let events = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            events.send(event);
        });

        self.timers.insert(timer, handle);
        debug!(?timer, ?after, "started timer");
    }

    pub(super) fn stop_timer(&mut self, timer: Timer) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
            debug!(?timer, "stopped timer");
        }
    }

    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: AlarmState) {
        self.state = state;
    }

    /// Receive one queued event and process it.
    #[cfg(test)]
    pub(crate) async fn pump_one(&mut self) {
        let event = self.events_rx.recv().await.expect("event queue closed");
        self.handle_event(event).await;
    }
}

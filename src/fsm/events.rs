//! Events consumed by the alarm state machine.
//!
//! Every producer (bus subscribers, the interrupt poller, timers, the
//! command intake) funnels through [`EventSender`], a bounded queue that
//! drops the newest event with a warning rather than ever blocking a
//! producer on the machine.

use tokio::sync::mpsc;

use super::VehicleState;
use crate::tracing::prelude::*;

pub const EVENT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start-up sync is done; the machine may leave `Init`.
    InitComplete,
    /// The `alarm.enabled` setting changed.
    AlarmModeChanged(bool),
    /// The `alarm.honk` setting changed.
    HornSettingChanged(bool),
    /// The `alarm.duration` setting changed (seconds).
    AlarmDurationChanged(u32),
    /// The `alarm.hair-trigger` setting changed.
    HairTriggerChanged(bool),
    /// The `alarm.hair-trigger-duration` setting changed (seconds).
    HairTriggerDurationChanged(u32),
    VehicleStateChanged(VehicleState),
    /// The motion sensor latched its slow/no-motion interrupt.
    BmxInterrupt { timestamp_ms: u64 },
    DelayArmedTimer,
    Level1CooldownTimer,
    Level1CheckTimer,
    Level2CheckTimer,
    /// Re-arm the sensor for the tail of the waiting-movement window.
    ChipSetupTimer,
    MinorMovement,
    MajorMovement,
    NoMovement,
    /// External request to sound the alarm for the given seconds.
    ManualTrigger { duration_secs: u32 },
    /// Authorised seatbox opening announced by the vehicle service.
    SeatboxOpened,
    SeatboxClosed,
    /// Seatbox lock opened with no authorisation on record.
    UnauthorizedSeatbox,
}

impl Event {
    /// Stable name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Event::InitComplete => "init_complete",
            Event::AlarmModeChanged(_) => "alarm_mode_changed",
            Event::HornSettingChanged(_) => "horn_setting_changed",
            Event::AlarmDurationChanged(_) => "alarm_duration_changed",
            Event::HairTriggerChanged(_) => "hair_trigger_changed",
            Event::HairTriggerDurationChanged(_) => "hair_trigger_duration_changed",
            Event::VehicleStateChanged(_) => "vehicle_state_changed",
            Event::BmxInterrupt { .. } => "bmx_interrupt",
            Event::DelayArmedTimer => "delay_armed_timer",
            Event::Level1CooldownTimer => "level1_cooldown_timer",
            Event::Level1CheckTimer => "level1_check_timer",
            Event::Level2CheckTimer => "level2_check_timer",
            Event::ChipSetupTimer => "chip_setup_timer",
            Event::MinorMovement => "minor_movement",
            Event::MajorMovement => "major_movement",
            Event::NoMovement => "no_movement",
            Event::ManualTrigger { .. } => "manual_trigger",
            Event::SeatboxOpened => "seatbox_opened",
            Event::SeatboxClosed => "seatbox_closed",
            Event::UnauthorizedSeatbox => "unauthorized_seatbox",
        }
    }
}

/// Cloneable handle for pushing events at the state machine.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Enqueue an event. A full queue drops the event with a warning;
    /// the machine is never blocked by a producer.
    pub fn send(&self, event: Event) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.tx.try_send(event) {
            warn!(event = event.name(), "event queue full, dropping event");
        }
    }
}

/// Create the bounded event queue.
pub fn channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest_without_blocking() {
        let (sender, mut rx) = channel();

        for _ in 0..EVENT_QUEUE_CAPACITY + 50 {
            sender.send(Event::InitComplete);
        }

        let mut queued = 0;
        while rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, EVENT_QUEUE_CAPACITY);
    }
}

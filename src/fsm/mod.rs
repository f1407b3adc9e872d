//! The alarm state machine and the capability traits it consumes.
//!
//! The machine depends on four narrow seams — motion-sensor control, status
//! publication, suspend inhibition, and the alarm output — declared here so
//! tests can substitute mocks that never touch I2C, D-Bus, or the bus.

pub mod actions;
pub mod events;
pub mod machine;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::bmx::{InterruptPin, Sensitivity};
use crate::error::Result;

pub use events::{Event, EventSender};
pub use machine::StateMachine;

/// The ten alarm states. `Init` is initial; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Init,
    WaitingEnabled,
    Disarmed,
    DelayArmed,
    Armed,
    TriggerL1Wait,
    TriggerL1,
    TriggerL2,
    WaitingMovement,
    SeatboxAccess,
}

impl AlarmState {
    /// The status string published to the bus for this state.
    pub fn status(self) -> &'static str {
        match self {
            AlarmState::Init => "init",
            AlarmState::WaitingEnabled => "disabled",
            AlarmState::Disarmed => "disarmed",
            AlarmState::DelayArmed => "delay-armed",
            AlarmState::Armed => "armed",
            AlarmState::TriggerL1Wait | AlarmState::TriggerL1 => "level-1-triggered",
            AlarmState::TriggerL2 | AlarmState::WaitingMovement => "level-2-triggered",
            AlarmState::SeatboxAccess => "seatbox-access",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmState::Init => "init",
            AlarmState::WaitingEnabled => "waiting_enabled",
            AlarmState::Disarmed => "disarmed",
            AlarmState::DelayArmed => "delay_armed",
            AlarmState::Armed => "armed",
            AlarmState::TriggerL1Wait => "trigger_level_1_wait",
            AlarmState::TriggerL1 => "trigger_level_1",
            AlarmState::TriggerL2 => "trigger_level_2",
            AlarmState::WaitingMovement => "waiting_movement",
            AlarmState::SeatboxAccess => "seatbox_access",
        };
        f.write_str(s)
    }
}

/// Vehicle state mirrored from the bus. Core logic only ever asks
/// [`VehicleState::is_stand_by`]; the rest is carried for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Unknown,
    Init,
    StandBy,
    Parked,
    ReadyToDrive,
    WaitingSeatbox,
    ShuttingDown,
    WaitingHibernation,
}

impl VehicleState {
    pub fn parse(s: &str) -> Self {
        match s {
            "init" => VehicleState::Init,
            "stand-by" => VehicleState::StandBy,
            "parked" => VehicleState::Parked,
            "ready-to-drive" => VehicleState::ReadyToDrive,
            "waiting-seatbox" => VehicleState::WaitingSeatbox,
            "shutting-down" => VehicleState::ShuttingDown,
            "waiting-hibernation" => VehicleState::WaitingHibernation,
            _ => VehicleState::Unknown,
        }
    }

    pub fn is_stand_by(self) -> bool {
        self == VehicleState::StandBy
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VehicleState::Unknown => "unknown",
            VehicleState::Init => "init",
            VehicleState::StandBy => "stand-by",
            VehicleState::Parked => "parked",
            VehicleState::ReadyToDrive => "ready-to-drive",
            VehicleState::WaitingSeatbox => "waiting-seatbox",
            VehicleState::ShuttingDown => "shutting-down",
            VehicleState::WaitingHibernation => "waiting-hibernation",
        };
        f.write_str(s)
    }
}

/// Motion-sensor capability the machine drives between phases.
#[async_trait]
pub trait MotionControl: Send + Sync {
    async fn set_sensitivity(&self, sensitivity: Sensitivity) -> Result<()>;
    async fn set_interrupt_pin(&self, pin: InterruptPin) -> Result<()>;
    async fn soft_reset(&self) -> Result<()>;
    async fn enable_interrupt(&self) -> Result<()>;
    async fn disable_interrupt(&self) -> Result<()>;
}

/// Publication of the alarm status string on every transition.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_status(&self, status: &str) -> Result<()>;
}

/// Scoped hold on the system suspend inhibitor.
#[async_trait]
pub trait SuspendInhibit: Send + Sync {
    async fn acquire(&self, reason: &str) -> Result<()>;
    async fn release(&self) -> Result<()>;
}

/// The horn/hazard actuator.
#[async_trait]
pub trait AlarmOutput: Send + Sync {
    async fn start(&self, duration: Duration) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    fn set_horn_enabled(&self, enabled: bool);
    async fn blink_hazards(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Mock seams used across the machine tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::bmx::{InterruptPin, Sensitivity};
    use crate::config::Config;

    #[derive(Default)]
    pub struct MockMotion {
        pub sensitivity: Mutex<Option<Sensitivity>>,
        pub pin: Mutex<Option<InterruptPin>>,
        pub interrupt_enabled: AtomicBool,
        pub resets: AtomicUsize,
    }

    #[async_trait]
    impl MotionControl for MockMotion {
        async fn set_sensitivity(&self, sensitivity: Sensitivity) -> Result<()> {
            *self.sensitivity.lock().unwrap() = Some(sensitivity);
            Ok(())
        }

        async fn set_interrupt_pin(&self, pin: InterruptPin) -> Result<()> {
            *self.pin.lock().unwrap() = Some(pin);
            Ok(())
        }

        async fn soft_reset(&self) -> Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn enable_interrupt(&self) -> Result<()> {
            self.interrupt_enabled.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disable_interrupt(&self) -> Result<()> {
            self.interrupt_enabled.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockStatus {
        pub published: Mutex<Vec<String>>,
    }

    impl MockStatus {
        pub fn last(&self) -> Option<String> {
            self.published.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl StatusSink for MockStatus {
        async fn publish_status(&self, status: &str) -> Result<()> {
            self.published.lock().unwrap().push(status.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockInhibit {
        pub held: AtomicBool,
        pub reason: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SuspendInhibit for MockInhibit {
        async fn acquire(&self, reason: &str) -> Result<()> {
            self.held.store(true, Ordering::SeqCst);
            *self.reason.lock().unwrap() = Some(reason.to_string());
            Ok(())
        }

        async fn release(&self) -> Result<()> {
            self.held.store(false, Ordering::SeqCst);
            *self.reason.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockOutput {
        pub active: AtomicBool,
        pub duration: Mutex<Option<Duration>>,
        pub horn_enabled: AtomicBool,
        pub blinks: AtomicUsize,
        pub starts: AtomicUsize,
    }

    #[async_trait]
    impl AlarmOutput for MockOutput {
        async fn start(&self, duration: Duration) -> Result<()> {
            self.active.store(true, Ordering::SeqCst);
            *self.duration.lock().unwrap() = Some(duration);
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn set_horn_enabled(&self, enabled: bool) {
            self.horn_enabled.store(enabled, Ordering::SeqCst);
        }

        async fn blink_hazards(&self) -> Result<()> {
            self.blinks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct Harness {
        pub sm: StateMachine,
        pub motion: Arc<MockMotion>,
        pub status: Arc<MockStatus>,
        pub inhibitor: Arc<MockInhibit>,
        pub output: Arc<MockOutput>,
    }

    pub fn harness() -> Harness {
        harness_with(Config::default())
    }

    pub fn harness_with(config: Config) -> Harness {
        let motion = Arc::new(MockMotion::default());
        let status = Arc::new(MockStatus::default());
        let inhibitor = Arc::new(MockInhibit::default());
        let output = Arc::new(MockOutput::default());

        let sm = StateMachine::new(
            motion.clone(),
            status.clone(),
            inhibitor.clone(),
            output.clone(),
            &config,
        );

        Harness {
            sm,
            motion,
            status,
            inhibitor,
            output,
        }
    }
}

//! Horn and hazard actuation.
//!
//! The audible pattern is quantised to 800 ms cycles (400 ms on, 400 ms
//! off); a requested duration is rounded down past a 200 ms buffer so a run
//! never ends inside a half-cycle with the horn still sounding. Only one
//! pulse loop exists at a time; starting over an active run replaces it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fsm::{AlarmOutput, Event, EventSender};
use crate::tracing::prelude::*;

const HALF_CYCLE: Duration = Duration::from_millis(400);
const FULL_CYCLE_MS: u64 = 800;
/// Rounding buffer keeping a truncated trailing half-cycle out of the run.
const CYCLE_BUFFER_MS: u64 = 200;
const BLINK_DURATION: Duration = Duration::from_millis(800);

/// Physical actuation surface: the horn and blinker queues plus the
/// `alarm-active` flag. Production pushes to the bus; tests record.
#[async_trait]
pub trait Actuator: Send + Sync + 'static {
    async fn push_horn(&self, command: &str) -> Result<()>;
    async fn push_blinker(&self, command: &str) -> Result<()>;
    async fn set_alarm_active(&self, active: bool) -> Result<()>;
}

/// Number of full horn cycles a requested duration buys.
pub fn horn_cycles(duration: Duration) -> u64 {
    let duration_ms = duration.as_millis() as u64;
    std::cmp::max(1, duration_ms.saturating_sub(CYCLE_BUFFER_MS) / FULL_CYCLE_MS)
}

pub struct OutputController<A: Actuator> {
    actuator: Arc<A>,
    horn_enabled: Arc<AtomicBool>,
    run: tokio::sync::Mutex<Option<Run>>,
}

struct Run {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<A: Actuator> OutputController<A> {
    pub fn new(actuator: A, horn_enabled: bool) -> Self {
        Self {
            actuator: Arc::new(actuator),
            horn_enabled: Arc::new(AtomicBool::new(horn_enabled)),
            run: tokio::sync::Mutex::new(None),
        }
    }

    async fn stop_run(&self, run: &mut Option<Run>) {
        if let Some(run) = run.take() {
            info!("stopping alarm output");
            run.cancel.cancel();
            // The loop pushes the offs on its way out; wait for them so a
            // caller observing stop() never races the actuator.
            let _ = run.task.await;
        }
    }
}

#[async_trait]
impl<A: Actuator> AlarmOutput for OutputController<A> {
    async fn start(&self, duration: Duration) -> Result<()> {
        let mut run = self.run.lock().await;

        if run.is_some() {
            warn!("alarm output already active, replacing current run");
            self.stop_run(&mut run).await;
        }

        info!(?duration, cycles = horn_cycles(duration), "starting alarm output");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pulse_loop(
            self.actuator.clone(),
            self.horn_enabled.clone(),
            duration,
            cancel.clone(),
        ));

        *run = Some(Run { cancel, task });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        self.stop_run(&mut run).await;
        Ok(())
    }

    fn set_horn_enabled(&self, enabled: bool) {
        self.horn_enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "horn setting updated");
    }

    /// One hazards pulse, detached so state transitions never stall on it.
    async fn blink_hazards(&self) -> Result<()> {
        let actuator = self.actuator.clone();
        tokio::spawn(async move {
            if let Err(e) = actuator.push_blinker("both").await {
                warn!(error = %e, "failed to switch hazards on");
            }
            tokio::time::sleep(BLINK_DURATION).await;
            if let Err(e) = actuator.push_blinker("off").await {
                warn!(error = %e, "failed to switch hazards off");
            }
        });
        Ok(())
    }
}

/// The pulse loop: hazards on for the whole run, horn alternating each half
/// cycle while enabled, everything driven off again on any exit path.
async fn pulse_loop<A: Actuator>(
    actuator: Arc<A>,
    horn_enabled: Arc<AtomicBool>,
    duration: Duration,
    cancel: CancellationToken,
) {
    if let Err(e) = actuator.push_blinker("both").await {
        warn!(error = %e, "failed to activate hazards");
    }
    if let Err(e) = actuator.set_alarm_active(true).await {
        warn!(error = %e, "failed to flag alarm active");
    }

    let ticks = 2 * horn_cycles(duration);
    let mut interval = tokio::time::interval(HALF_CYCLE);
    let mut horn_sounded = false;
    let mut cancelled = false;

    for tick in 0..ticks {
        tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = interval.tick() => {
                if horn_enabled.load(Ordering::SeqCst) {
                    let command = if tick % 2 == 0 { "on" } else { "off" };
                    if let Err(e) = actuator.push_horn(command).await {
                        warn!(error = %e, command, "failed to push horn command");
                    }
                    horn_sounded = true;
                }
            }
        }
    }

    // The final half-cycle after the last tick completes the run's
    // cycles * 800 ms span.
    if !cancelled {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(HALF_CYCLE) => {}
        }
        info!("alarm output run complete");
    } else {
        info!("alarm output run cancelled");
    }

    if horn_sounded {
        if let Err(e) = actuator.push_horn("off").await {
            warn!(error = %e, "failed to silence horn");
        }
    }
    if let Err(e) = actuator.push_blinker("off").await {
        warn!(error = %e, "failed to switch hazards off");
    }
    if let Err(e) = actuator.set_alarm_active(false).await {
        warn!(error = %e, "failed to clear alarm-active flag");
    }
}

/// A command read from the external intake queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    Enable,
    Disable,
    Start { duration_secs: u32 },
}

/// Parse an intake command. `start:<N>` demands a positive integer.
pub fn parse_command(raw: &str) -> Result<Command> {
    match raw {
        "stop" => Ok(Command::Stop),
        "enable" => Ok(Command::Enable),
        "disable" => Ok(Command::Disable),
        _ => {
            let duration = raw
                .strip_prefix("start:")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| Error::InvalidCommand(raw.to_string()))?;
            Ok(Command::Start {
                duration_secs: duration,
            })
        }
    }
}

/// Foreground intake of string commands from the `scooter:alarm` queue.
///
/// Runs on its own bus connection because the pop blocks it for up to five
/// seconds at a time.
pub async fn command_intake(
    bus: crate::bus::Bus,
    output: Arc<dyn AlarmOutput>,
    events: EventSender,
    cancellation: CancellationToken,
) {
    info!("alarm command intake started");

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!("alarm command intake stopped");
                return;
            }
            popped = bus.queue_pop("scooter:alarm", 5) => {
                let raw = match popped {
                    Ok(Some(raw)) => raw,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(error = %e, "failed to read alarm command queue");
                        continue;
                    }
                };

                info!(command = %raw, "received alarm command");
                match parse_command(&raw) {
                    Ok(command) => handle_command(&bus, &output, &events, command).await,
                    Err(e) => error!(error = %e, "dropping alarm command"),
                }
            }
        }
    }
}

async fn handle_command(
    bus: &crate::bus::Bus,
    output: &Arc<dyn AlarmOutput>,
    events: &EventSender,
    command: Command,
) {
    match command {
        Command::Stop => {
            if let Err(e) = output.stop().await {
                error!(error = %e, "failed to stop alarm output");
            }
        }
        // The setting round-trips through the bus so every watcher,
        // including our own subscriber, observes the change.
        Command::Enable => write_alarm_enabled(bus, "true").await,
        Command::Disable => write_alarm_enabled(bus, "false").await,
        Command::Start { duration_secs } => {
            if let Err(e) = output.start(Duration::from_secs(duration_secs.into())).await {
                error!(error = %e, "failed to start alarm output");
            }
            events.send(Event::ManualTrigger { duration_secs });
        }
    }
}

async fn write_alarm_enabled(bus: &crate::bus::Bus, value: &str) {
    if let Err(e) = bus.hash_set("settings", "alarm.enabled", value).await {
        error!(error = %e, value, "failed to write alarm.enabled setting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActuator {
        horn: Mutex<Vec<String>>,
        blinker: Mutex<Vec<String>>,
        active: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl Actuator for Arc<RecordingActuator> {
        async fn push_horn(&self, command: &str) -> Result<()> {
            self.horn.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn push_blinker(&self, command: &str) -> Result<()> {
            self.blinker.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn set_alarm_active(&self, active: bool) -> Result<()> {
            self.active.lock().unwrap().push(active);
            Ok(())
        }
    }

    fn controller(horn: bool) -> (OutputController<Arc<RecordingActuator>>, Arc<RecordingActuator>) {
        let recorder = Arc::new(RecordingActuator::default());
        (OutputController::new(recorder.clone(), horn), recorder)
    }

    #[test]
    fn cycle_quantisation_table() {
        let cases = [
            (800, 1),
            (1000, 1),
            (1800, 2),
            (10_000, 12),
        ];
        for (duration_ms, cycles) in cases {
            assert_eq!(
                horn_cycles(Duration::from_millis(duration_ms)),
                cycles,
                "{duration_ms} ms"
            );
        }
    }

    #[test]
    fn tiny_durations_still_buy_one_cycle() {
        assert_eq!(horn_cycles(Duration::from_millis(0)), 1);
        assert_eq!(horn_cycles(Duration::from_millis(100)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_pushes_hazards_horn_pattern_and_flags() {
        let (controller, recorder) = controller(true);

        // 1 s buys a single 800 ms cycle: on at 0 ms, off at 400 ms.
        controller.start(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(*recorder.horn.lock().unwrap(), vec!["on", "off", "off"]);
        assert_eq!(*recorder.blinker.lock().unwrap(), vec!["both", "off"]);
        assert_eq!(*recorder.active.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_horn_stays_silent_but_hazards_run() {
        let (controller, recorder) = controller(false);

        controller.start(Duration::from_millis(800)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(recorder.horn.lock().unwrap().is_empty());
        assert_eq!(*recorder.blinker.lock().unwrap(), vec!["both", "off"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drives_everything_off_immediately() {
        let (controller, recorder) = controller(true);

        controller.start(Duration::from_secs(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;

        controller.stop().await.unwrap();

        let horn = recorder.horn.lock().unwrap().clone();
        assert_eq!(horn.last().map(String::as_str), Some("off"));
        assert_eq!(
            recorder.blinker.lock().unwrap().last().map(String::as_str),
            Some("off")
        );
        assert_eq!(recorder.active.lock().unwrap().clone(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (controller, recorder) = controller(true);

        controller.stop().await.unwrap();
        assert!(recorder.blinker.lock().unwrap().is_empty());

        controller.start(Duration::from_millis(800)).await.unwrap();
        controller.stop().await.unwrap();
        controller.stop().await.unwrap();

        let blinker = recorder.blinker.lock().unwrap().clone();
        assert_eq!(blinker.iter().filter(|c| *c == "off").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_active_replaces_the_run() {
        let (controller, recorder) = controller(false);

        controller.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        controller.start(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // First run was shut down (off + inactive), second ran to completion.
        assert_eq!(
            *recorder.blinker.lock().unwrap(),
            vec!["both", "off", "both", "off"]
        );
        assert_eq!(
            *recorder.active.lock().unwrap(),
            vec![true, false, true, false]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mid_run_horn_disable_cannot_leave_horn_on() {
        let (controller, recorder) = controller(true);

        controller.start(Duration::from_secs(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        controller.set_horn_enabled(false);
        controller.stop().await.unwrap();

        // The "on" pushed at tick zero is followed by a trailing "off".
        let horn = recorder.horn.lock().unwrap().clone();
        assert_eq!(horn.first().map(String::as_str), Some("on"));
        assert_eq!(horn.last().map(String::as_str), Some("off"));
    }

    #[tokio::test(start_paused = true)]
    async fn blink_hazards_pulses_once() {
        let (controller, recorder) = controller(false);

        controller.blink_hazards().await.unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert_eq!(*recorder.blinker.lock().unwrap(), vec!["both", "off"]);
    }

    #[test]
    fn command_grammar() {
        assert_eq!(parse_command("stop").unwrap(), Command::Stop);
        assert_eq!(parse_command("enable").unwrap(), Command::Enable);
        assert_eq!(parse_command("disable").unwrap(), Command::Disable);
        assert_eq!(
            parse_command("start:15").unwrap(),
            Command::Start { duration_secs: 15 }
        );

        for invalid in ["start:0", "start:-3", "start:abc", "honk", ""] {
            assert!(
                matches!(parse_command(invalid), Err(Error::InvalidCommand(_))),
                "{invalid:?}"
            );
        }
    }
}

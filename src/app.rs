//! Start-up wiring and task lifecycle.
//!
//! Everything long-running is a tokio task hanging off one cancellation
//! token: the state machine loop, the interrupt poller, the three bus
//! watchers, and the command intake. Start-up order matters — kernel
//! drivers are unbound before the bus devices open, and the initial sync
//! runs only once every consumer task is wired up.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::bmx::BmxController;
use crate::bus::{Bus, BusActuator, InterruptPublisher, StatusPublisher, Subscriber};
use crate::config::Config;
use crate::error::Result;
use crate::fsm::StateMachine;
use crate::hardware::registers::{ACCEL_ADDR, GYRO_ADDR};
use crate::hardware::{unbind, Accelerometer, Gyroscope, InterruptPoller, PollerHandle, SmbusDevice};
use crate::inhibitor::LogindInhibitor;
use crate::output::{command_intake, OutputController};
use crate::tracing::prelude::*;

pub async fn run(config: Config, cancellation: CancellationToken) -> Result<()> {
    info!(
        i2c_bus = %config.i2c_bus,
        bus_addr = %config.bus_addr,
        "starting alarm daemon"
    );

    if let Err(e) = unbind::unbind_bmx055().await {
        warn!(error = %e, "failed to unbind kernel drivers");
    }

    let bus = Bus::connect(&config.bus_addr).await?;

    info!("initializing motion sensor");
    let accel = Arc::new(Mutex::new(Accelerometer::new(SmbusDevice::open(
        &config.i2c_bus,
        ACCEL_ADDR,
    )?)?));
    let gyro = Arc::new(Mutex::new(Gyroscope::new(SmbusDevice::open(
        &config.i2c_bus,
        GYRO_ADDR,
    )?)?));

    let poller_handle = PollerHandle::default();
    let poller = InterruptPoller::new(
        accel.clone(),
        InterruptPublisher::new(bus.clone()),
        poller_handle.clone(),
    );
    let poller_task = tokio::spawn(poller.run(cancellation.clone()));

    let motion = Arc::new(BmxController::new(accel, gyro, poller_handle));
    let output = Arc::new(OutputController::new(
        BusActuator::new(bus.clone()),
        config.horn_enabled,
    ));
    let inhibitor = Arc::new(LogindInhibitor::connect().await?);
    let status = Arc::new(StatusPublisher::new(bus.clone()));

    let mut machine = StateMachine::new(
        motion,
        status,
        inhibitor,
        output.clone(),
        &config,
    );
    let events = machine.events();
    machine.bootstrap().await;

    publish_sensor_inventory(&bus).await;
    write_through_flags(&bus, &config).await;

    let subscriber = Subscriber::new(bus.clone(), events.clone(), config.seatbox_trigger);
    if let Err(e) = subscriber.initial_sync().await {
        warn!(error = %e, "initial state sync failed");
    }

    let machine_task = tokio::spawn(machine.run(cancellation.clone()));
    tokio::spawn(subscriber.clone().watch_settings(cancellation.clone()));
    tokio::spawn(subscriber.clone().watch_vehicle(cancellation.clone()));
    tokio::spawn(subscriber.watch_interrupts(cancellation.clone()));

    let intake_bus = bus.dedicated().await?;
    tokio::spawn(command_intake(
        intake_bus,
        output,
        events,
        cancellation.clone(),
    ));

    cancellation.cancelled().await;
    info!("shutting down");

    // The machine's teardown releases timers, output, and the inhibitor;
    // wait for it (and the poller) so nothing is left actuating.
    let _ = machine_task.await;
    let _ = poller_task.await;

    Ok(())
}

/// Describe the sensor on the bmx hash for the other services to inspect.
async fn publish_sensor_inventory(bus: &Bus) {
    for (field, value) in [
        ("initialized", "true"),
        ("interrupt", "disabled"),
        ("sensitivity", "none"),
        ("pin", "none"),
    ] {
        if let Err(e) = bus.hash_set("bmx", field, value).await {
            warn!(field, error = %e, "failed to publish sensor inventory");
            return;
        }
    }
}

/// Flags the operator set explicitly become the system-wide settings.
async fn write_through_flags(bus: &Bus, config: &Config) {
    if config.horn_flag_set {
        let value = if config.horn_enabled { "true" } else { "false" };
        info!(value, "writing horn flag to settings");
        if let Err(e) = bus.hash_set("settings", "alarm.honk", value).await {
            error!(error = %e, "failed to write alarm.honk setting");
        }
    }

    if config.duration_flag_set {
        let value = config.alarm_duration_secs.to_string();
        info!(value, "writing duration flag to settings");
        if let Err(e) = bus.hash_set("settings", "alarm.duration", &value).await {
            error!(error = %e, "failed to write alarm.duration setting");
        }
    }
}

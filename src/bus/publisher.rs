//! Write-side bus adapters: status, interrupt channel, actuation queues.

use async_trait::async_trait;

use super::Bus;
use crate::error::Result;
use crate::fsm::StatusSink;
use crate::hardware::poller::InterruptSink;
use crate::output::Actuator;

/// Publishes the alarm status string on every state transition.
pub struct StatusPublisher {
    bus: Bus,
}

impl StatusPublisher {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StatusSink for StatusPublisher {
    async fn publish_status(&self, status: &str) -> Result<()> {
        self.bus.hash_set("alarm", "status", status).await
    }
}

/// Forwards detected motion interrupts onto the `bmx:interrupt` channel.
pub struct InterruptPublisher {
    bus: Bus,
}

impl InterruptPublisher {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl InterruptSink for InterruptPublisher {
    async fn publish_interrupt(&self, timestamp_ms: u64) -> Result<()> {
        self.bus
            .publish("bmx:interrupt", &timestamp_ms.to_string())
            .await
    }
}

/// Drives the horn and blinker services through their command queues and
/// mirrors the alarm-active flag into the alarm hash.
pub struct BusActuator {
    bus: Bus,
}

impl BusActuator {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Actuator for BusActuator {
    async fn push_horn(&self, command: &str) -> Result<()> {
        self.bus.queue_push("scooter:horn", command).await
    }

    async fn push_blinker(&self, command: &str) -> Result<()> {
        self.bus.queue_push("scooter:blinker", command).await
    }

    async fn set_alarm_active(&self, active: bool) -> Result<()> {
        let value = if active { "true" } else { "false" };
        self.bus.hash_set("alarm", "alarm-active", value).await
    }
}

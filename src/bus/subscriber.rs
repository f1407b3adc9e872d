//! Read-side bus adapters: settings, vehicle state, and motion interrupts.
//!
//! Change notifications carry only the name of the field that changed; the
//! watcher re-reads that field and injects the matching event. On start-up
//! every watched field is read once so the state machine settles into the
//! right state without waiting for the first change.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::Bus;
use crate::error::Result;
use crate::fsm::{Event, EventSender, VehicleState};
use crate::tracing::prelude::*;

/// How long to wait before rebuilding a dropped pub/sub connection.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Subscriber {
    bus: Bus,
    events: EventSender,
    seatbox_trigger: bool,
}

impl Subscriber {
    pub fn new(bus: Bus, events: EventSender, seatbox_trigger: bool) -> Self {
        Self {
            bus,
            events,
            seatbox_trigger,
        }
    }

    /// Read every watched field once and inject the matching events,
    /// finishing with `InitComplete` so the machine leaves `Init` only
    /// after the synced context landed.
    pub async fn initial_sync(&self) -> Result<()> {
        if let Some(state) = self.read("vehicle", "state").await {
            let state = VehicleState::parse(&state);
            info!(%state, "initial vehicle state");
            self.events.send(Event::VehicleStateChanged(state));
        }

        for field in [
            "alarm.enabled",
            "alarm.honk",
            "alarm.duration",
            "alarm.hair-trigger",
            "alarm.hair-trigger-duration",
        ] {
            if let Some(value) = self.read("settings", field).await {
                if let Some(event) = settings_event(field, &value) {
                    info!(field, value, "initial setting");
                    self.events.send(event);
                }
            }
        }

        self.events.send(Event::InitComplete);
        Ok(())
    }

    async fn read(&self, hash: &str, field: &str) -> Option<String> {
        match self.bus.hash_get(hash, field).await {
            Ok(value) => value,
            Err(e) => {
                warn!(hash, field, error = %e, "failed to read field");
                None
            }
        }
    }

    /// Watch the settings hash for alarm configuration changes.
    pub async fn watch_settings(self, cancellation: CancellationToken) {
        self.watch("settings", cancellation, |sub, payload| async move {
            if let Some(value) = sub.read("settings", &payload).await {
                if let Some(event) = settings_event(&payload, &value) {
                    debug!(field = %payload, value, "setting changed");
                    sub.events.send(event);
                }
            }
        })
        .await;
    }

    /// Watch the vehicle hash for state and seatbox changes.
    pub async fn watch_vehicle(self, cancellation: CancellationToken) {
        self.watch("vehicle", cancellation, |sub, payload| async move {
            match payload.as_str() {
                "state" => {
                    if let Some(value) = sub.read("vehicle", "state").await {
                        let state = VehicleState::parse(&value);
                        debug!(%state, "vehicle state changed");
                        sub.events.send(Event::VehicleStateChanged(state));
                    }
                }
                "seatbox:opened" => {
                    info!("authorised seatbox opening");
                    sub.events.send(Event::SeatboxOpened);
                }
                "seatbox:lock" => {
                    if let Some(value) = sub.read("vehicle", "seatbox:lock").await {
                        if let Some(event) = seatbox_lock_event(&value, sub.seatbox_trigger) {
                            info!(lock = %value, "seatbox lock changed");
                            sub.events.send(event);
                        }
                    }
                }
                _ => {}
            }
        })
        .await;
    }

    /// Watch the interrupt channel fed by the poller.
    pub async fn watch_interrupts(self, cancellation: CancellationToken) {
        self.watch("bmx:interrupt", cancellation, |sub, payload| async move {
            let timestamp_ms = payload.parse().unwrap_or(0);
            info!(timestamp_ms, "motion interrupt received");
            sub.events.send(Event::BmxInterrupt { timestamp_ms });
        })
        .await;
    }

    /// Subscribe to one channel and feed payloads to `handle`, rebuilding
    /// the subscription if the connection drops.
    async fn watch<F, Fut>(self, channel: &str, cancellation: CancellationToken, handle: F)
    where
        F: Fn(Subscriber, String) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        info!(channel, "subscribing");

        loop {
            let mut pubsub = match self.subscribe(channel).await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    warn!(channel, error = %e, "subscribe failed, retrying");
                    tokio::select! {
                        _ = cancellation.cancelled() => return,
                        _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => continue,
                    }
                }
            };

            let mut messages = pubsub.on_message();

            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        info!(channel, "subscription stopped");
                        return;
                    }
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            warn!(channel, "subscription lost, reconnecting");
                            break;
                        };
                        match msg.get_payload::<String>() {
                            Ok(payload) => handle(self.clone(), payload).await,
                            Err(e) => warn!(channel, error = %e, "undecodable message"),
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<redis::aio::PubSub> {
        let mut pubsub = self.bus.pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}

/// Map a settings-hash field to its event.
fn settings_event(field: &str, value: &str) -> Option<Event> {
    match field {
        "alarm.enabled" => Some(Event::AlarmModeChanged(value == "true")),
        "alarm.honk" => Some(Event::HornSettingChanged(value == "true")),
        "alarm.duration" => match value.parse() {
            Ok(duration) => Some(Event::AlarmDurationChanged(duration)),
            Err(_) => {
                warn!(value, "invalid alarm.duration value");
                None
            }
        },
        "alarm.hair-trigger" => Some(Event::HairTriggerChanged(value == "true")),
        "alarm.hair-trigger-duration" => match value.parse() {
            Ok(duration) => Some(Event::HairTriggerDurationChanged(duration)),
            Err(_) => {
                warn!(value, "invalid alarm.hair-trigger-duration value");
                None
            }
        },
        _ => None,
    }
}

/// Map a seatbox lock reading to its event. An authorised opening reaches
/// the machine separately as `SeatboxOpened` before the lock reads "open".
fn seatbox_lock_event(value: &str, seatbox_trigger: bool) -> Option<Event> {
    match value {
        "closed" => Some(Event::SeatboxClosed),
        "open" if seatbox_trigger => Some(Event::UnauthorizedSeatbox),
        "open" => {
            debug!("seatbox trigger disabled, ignoring opening");
            None
        }
        _ => {
            warn!(value, "unexpected seatbox lock value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fields_map_to_events() {
        assert_eq!(
            settings_event("alarm.enabled", "true"),
            Some(Event::AlarmModeChanged(true))
        );
        assert_eq!(
            settings_event("alarm.enabled", "false"),
            Some(Event::AlarmModeChanged(false))
        );
        assert_eq!(
            settings_event("alarm.honk", "true"),
            Some(Event::HornSettingChanged(true))
        );
        assert_eq!(
            settings_event("alarm.duration", "30"),
            Some(Event::AlarmDurationChanged(30))
        );
        assert_eq!(
            settings_event("alarm.hair-trigger", "true"),
            Some(Event::HairTriggerChanged(true))
        );
        assert_eq!(
            settings_event("alarm.hair-trigger-duration", "5"),
            Some(Event::HairTriggerDurationChanged(5))
        );
    }

    #[test]
    fn malformed_or_unknown_settings_are_dropped() {
        assert_eq!(settings_event("alarm.duration", "soon"), None);
        assert_eq!(settings_event("alarm.duration", "-4"), None);
        assert_eq!(settings_event("alarm.hair-trigger-duration", ""), None);
        assert_eq!(settings_event("cruise.enabled", "true"), None);
    }

    #[test]
    fn seatbox_lock_mapping_honours_trigger_config() {
        assert_eq!(
            seatbox_lock_event("closed", true),
            Some(Event::SeatboxClosed)
        );
        assert_eq!(
            seatbox_lock_event("open", true),
            Some(Event::UnauthorizedSeatbox)
        );
        assert_eq!(seatbox_lock_event("open", false), None);
        assert_eq!(seatbox_lock_event("ajar", true), None);
    }
}

//! Polls the accelerometer's latched interrupt status.
//!
//! The INT2 line is physically wired but deliberately not used as a GPIO
//! interrupt; reading the latched status register every 100 ms costs at most
//! that much detection latency and gives clean enable/disable semantics
//! through a single atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::hardware::accel::Accelerometer;
use crate::hardware::i2c::RegisterBus;
use crate::tracing::prelude::*;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where detected interrupts go. Production publishes to the
/// `bmx:interrupt` bus channel; tests capture the timestamps.
#[async_trait]
pub trait InterruptSink: Send + Sync {
    async fn publish_interrupt(&self, timestamp_ms: u64) -> Result<()>;
}

/// Gate shared between the poller task and the BMX controller.
///
/// Single writer (the controller), single reader (the poller). Every poll
/// runs under the quiesce lock and re-checks the flag there, and
/// `disable()` takes the same lock after clearing the flag — so once
/// `disable()` returns, no further interrupt can be published.
#[derive(Clone, Default)]
pub struct PollerHandle {
    enabled: Arc<AtomicBool>,
    quiesce: Arc<tokio::sync::Mutex<()>>,
}

impl PollerHandle {
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        info!("interrupt polling enabled");
    }

    /// Stop polling. Returns only after any in-flight poll has finished.
    pub async fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let _quiesced = self.quiesce.lock().await;
        info!("interrupt polling disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn hold_quiesce(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.quiesce.lock().await
    }
}

pub struct InterruptPoller<B: RegisterBus, S: InterruptSink> {
    accel: Arc<Mutex<Accelerometer<B>>>,
    sink: S,
    handle: PollerHandle,
}

impl<B: RegisterBus, S: InterruptSink> InterruptPoller<B, S> {
    pub fn new(accel: Arc<Mutex<Accelerometer<B>>>, sink: S, handle: PollerHandle) -> Self {
        Self {
            accel,
            sink,
            handle,
        }
    }

    pub async fn run(self, cancellation: CancellationToken) {
        info!("interrupt poller started");

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("interrupt poller stopped");
                    return;
                }
                _ = interval.tick() => {
                    if self.handle.is_enabled() {
                        self.tick().await;
                    }
                }
            }
        }
    }

    /// One poll: read the latched status, publish on motion, clear the
    /// latch. Transient I2C failures are logged and survive to the next
    /// tick.
    async fn tick(&self) {
        // Held for the whole poll; disable() waits on it, making its
        // return a hard boundary for interrupt publication.
        let _quiesce = self.handle.hold_quiesce().await;

        if !self.handle.is_enabled() {
            return;
        }

        let triggered = match self.accel.lock().unwrap().interrupt_status() {
            Ok(triggered) => triggered,
            Err(e) => {
                warn!(error = %e, "interrupt status read failed");
                return;
            }
        };

        if !triggered {
            return;
        }

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        info!(timestamp_ms, "motion interrupt detected");

        if let Err(e) = self.sink.publish_interrupt(timestamp_ms).await {
            warn!(error = %e, "failed to publish motion interrupt");
        }

        if let Err(e) = self.accel.lock().unwrap().clear_latched_interrupt() {
            warn!(error = %e, "failed to clear latched interrupt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::i2c::fake::FakeBus;
    use crate::hardware::registers as reg;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<u64>);

    #[async_trait]
    impl InterruptSink for ChannelSink {
        async fn publish_interrupt(&self, timestamp_ms: u64) -> Result<()> {
            self.0.send(timestamp_ms).ok();
            Ok(())
        }
    }

    fn latched_accel() -> Arc<Mutex<Accelerometer<FakeBus>>> {
        let bus = FakeBus::with_regs(&[
            (reg::ACCEL_CHIP_ID, 0xFA),
            (reg::ACCEL_INT_STATUS_0, reg::INT_STATUS_SLOW_NO_MOT),
        ]);
        Arc::new(Mutex::new(Accelerometer::new(bus).unwrap()))
    }

    #[tokio::test]
    async fn disabled_gate_suppresses_publish_even_with_latched_status() {
        let accel = latched_accel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = InterruptPoller::new(accel.clone(), ChannelSink(tx), PollerHandle::default());

        poller.tick().await;

        assert!(rx.try_recv().is_err());
        // The latch is left alone too; clearing it belongs to an enabled run.
        let writes = accel.lock().unwrap().bus_mut().writes.clone();
        assert!(!writes.contains(&(reg::ACCEL_INT_LATCH, 0x80)));
    }

    #[tokio::test]
    async fn enabled_poller_publishes_and_clears_latch() {
        let accel = latched_accel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollerHandle::default();
        handle.enable();

        let poller = InterruptPoller::new(accel.clone(), ChannelSink(tx), handle);
        poller.tick().await;

        assert!(rx.try_recv().is_ok());
        let writes = accel.lock().unwrap().bus_mut().writes.clone();
        assert!(writes.contains(&(reg::ACCEL_INT_LATCH, 0x80)));
    }

    #[tokio::test]
    async fn quiet_sensor_publishes_nothing() {
        let bus = FakeBus::with_regs(&[(reg::ACCEL_CHIP_ID, 0xFA)]);
        let accel = Arc::new(Mutex::new(Accelerometer::new(bus).unwrap()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollerHandle::default();
        handle.enable();

        let poller = InterruptPoller::new(accel, ChannelSink(tx), handle);
        poller.tick().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gate_flips_are_visible_across_clones() {
        let handle = PollerHandle::default();
        let clone = handle.clone();

        handle.enable();
        assert!(clone.is_enabled());

        clone.disable().await;
        assert!(!handle.is_enabled());
    }

    #[tokio::test]
    async fn disable_waits_for_an_in_flight_poll() {
        let handle = PollerHandle::default();
        handle.enable();

        let held = handle.hold_quiesce().await;
        let disabling = tokio::spawn({
            let handle = handle.clone();
            async move { handle.disable().await }
        });

        tokio::task::yield_now().await;
        assert!(!disabling.is_finished());

        drop(held);
        disabling.await.unwrap();
        assert!(!handle.is_enabled());
    }
}

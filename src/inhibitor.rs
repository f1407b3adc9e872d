//! Suspend inhibition through the login manager.
//!
//! logind hands out a file descriptor per `Inhibit` call and keeps the block
//! for as long as the descriptor stays open, so holding and dropping an
//! `OwnedFd` is the whole lock protocol. Swapping reasons acquires the new
//! descriptor before the old one closes; the system can never slip into
//! suspend between the two.

use async_trait::async_trait;
use zbus::zvariant::OwnedFd;

use crate::error::Result;
use crate::fsm::SuspendInhibit;
use crate::tracing::prelude::*;

const LOGIND_DEST: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const LOGIND_IFACE: &str = "org.freedesktop.login1.Manager";

/// What we tell logind about ourselves.
const INHIBIT_WHAT: &str = "sleep";
const INHIBIT_WHO: &str = "scooter-alarm";
const INHIBIT_MODE: &str = "block";

struct Held {
    reason: String,
    // Dropping the descriptor releases the inhibitor.
    _fd: OwnedFd,
}

pub struct LogindInhibitor {
    conn: zbus::Connection,
    held: tokio::sync::Mutex<Option<Held>>,
}

impl LogindInhibitor {
    /// Connect to the system bus. Failing here is a start-up error; a
    /// failing `Inhibit` call later is merely logged by the caller.
    pub async fn connect() -> Result<Self> {
        let conn = zbus::Connection::system().await?;
        Ok(Self {
            conn,
            held: tokio::sync::Mutex::new(None),
        })
    }

    async fn inhibit(&self, reason: &str) -> Result<OwnedFd> {
        let reply = self
            .conn
            .call_method(
                Some(LOGIND_DEST),
                LOGIND_PATH,
                Some(LOGIND_IFACE),
                "Inhibit",
                &(INHIBIT_WHAT, INHIBIT_WHO, reason, INHIBIT_MODE),
            )
            .await?;

        Ok(reply.body().deserialize().map_err(zbus::Error::from)?)
    }
}

#[async_trait]
impl SuspendInhibit for LogindInhibitor {
    /// Acquire a sleep block. Re-acquiring with the reason already held is
    /// a no-op; a different reason overlaps the handles (new first, then
    /// old is dropped).
    async fn acquire(&self, reason: &str) -> Result<()> {
        let mut held = self.held.lock().await;

        if let Some(current) = held.as_ref() {
            if current.reason == reason {
                debug!(reason, "suspend inhibitor already held");
                return Ok(());
            }
        }

        let fd = self.inhibit(reason).await?;

        *held = Some(Held {
            reason: reason.to_string(),
            _fd: fd,
        });

        info!(reason, "acquired suspend inhibitor");
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut held = self.held.lock().await;

        if held.take().is_some() {
            info!("released suspend inhibitor");
        }

        Ok(())
    }
}

//! Daemon entry point: flags, logging, signals, exit codes.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use scooter_alarm::config::Config;
use scooter_alarm::tracing::prelude::*;
use scooter_alarm::{app, tracing};

#[derive(Parser, Debug)]
#[command(name = "scooter-alarmd", version, about = "Motion-alarm daemon")]
struct Cli {
    /// I2C bus device path carrying the BMX055
    #[arg(long, default_value = "/dev/i2c-3")]
    i2c_bus: String,

    /// Address of the key-value / pub-sub bus
    #[arg(long = "redis", default_value = "localhost:6379")]
    redis: String,

    /// Log level: debug, info, warn, error
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Alarm duration in seconds (written to settings when set)
    #[arg(long)]
    alarm_duration: Option<u32>,

    /// Sound the horn during the alarm (written to settings when set)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    horn_enabled: Option<bool>,

    /// Start a short alarm burst already on the first motion event
    #[arg(long, default_value_t = false)]
    hair_trigger: bool,

    /// Hair-trigger burst duration in seconds
    #[arg(long, default_value_t = 3)]
    hair_trigger_duration: u32,

    /// Level 1 cooldown duration in seconds
    #[arg(long, default_value_t = 15)]
    l1_cooldown: u32,

    /// Trigger the alarm on unauthorised seatbox opening
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true,
          num_args = 0..=1, default_missing_value = "true")]
    seatbox_trigger: bool,
}

impl Cli {
    fn into_config(self) -> (Config, String) {
        let log_level = self.log_level;
        let config = Config {
            i2c_bus: self.i2c_bus,
            bus_addr: self.redis,
            alarm_duration_secs: self.alarm_duration.unwrap_or(10),
            duration_flag_set: self.alarm_duration.is_some(),
            horn_enabled: self.horn_enabled.unwrap_or(false),
            horn_flag_set: self.horn_enabled.is_some(),
            hair_trigger: self.hair_trigger,
            hair_trigger_duration_secs: self.hair_trigger_duration,
            l1_cooldown_secs: self.l1_cooldown,
            seatbox_trigger: self.seatbox_trigger,
        };
        (config, log_level)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, log_level) = Cli::parse().into_config();
    tracing::init(&log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        i2c_bus = %config.i2c_bus,
        redis = %config.bus_addr,
        alarm_duration = config.alarm_duration_secs,
        horn_enabled = config.horn_enabled,
        hair_trigger = config.hair_trigger,
        l1_cooldown = config.l1_cooldown_secs,
        seatbox_trigger = config.seatbox_trigger,
        "scooter-alarm starting"
    );

    let cancellation = CancellationToken::new();

    tokio::spawn(wait_for_shutdown_signal(cancellation.clone()));

    app::run(config, cancellation).await?;

    info!("scooter-alarm stopped");
    Ok(())
}

async fn wait_for_shutdown_signal(cancellation: CancellationToken) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt"),
        _ = sigterm.recv() => info!("received terminate"),
    }

    cancellation.cancel();
}

/// Runtime configuration assembled from the command line.
///
/// `*_flag_set` fields record whether the operator passed the flag
/// explicitly; explicit values are written through to the settings hash at
/// start-up so the rest of the system observes them.
#[derive(Debug, Clone)]
pub struct Config {
    /// I2C character device carrying the BMX055 (e.g. `/dev/i2c-3`).
    pub i2c_bus: String,

    /// Address of the key-value / pub-sub bus, `host:port`.
    pub bus_addr: String,

    /// Siren run length once level 2 fires (seconds).
    pub alarm_duration_secs: u32,
    pub duration_flag_set: bool,

    /// Sound the horn during the siren pattern (hazards always run).
    pub horn_enabled: bool,
    pub horn_flag_set: bool,

    /// Fire a short alarm burst already on the first motion event.
    pub hair_trigger: bool,

    /// Burst length for hair-trigger mode (seconds).
    pub hair_trigger_duration_secs: u32,

    /// Level 1 cool-down before the confirmation window opens (seconds).
    pub l1_cooldown_secs: u32,

    /// Treat an unauthorised seatbox opening as an intrusion.
    pub seatbox_trigger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-3".to_string(),
            bus_addr: "localhost:6379".to_string(),
            alarm_duration_secs: 10,
            duration_flag_set: false,
            horn_enabled: false,
            horn_flag_set: false,
            hair_trigger: false,
            hair_trigger_duration_secs: 3,
            l1_cooldown_secs: 15,
            seatbox_trigger: true,
        }
    }
}

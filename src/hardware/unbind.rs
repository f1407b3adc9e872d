//! Detach the kernel's IIO drivers from the BMX055 dies.
//!
//! The i2c-dev ioctl refuses a slave address that a kernel driver still
//! owns, so each of the three dies is unbound before the bus is opened.
//! Boards shipping without the IIO modules simply have no unbind file; that
//! is not an error.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::tracing::prelude::*;

const SYSFS_I2C_DRIVERS: &str = "/sys/bus/i2c/drivers";

/// (kernel driver, device id) pairs for the three dies on bus 3.
const BINDINGS: [(&str, &str); 3] = [
    ("bmc150_accel_i2c", "3-0018"),
    ("bmg160_i2c", "3-0068"),
    ("bmm150_i2c", "3-0010"),
];

/// Unbind all BMX055 kernel drivers, then give the kernel 100 ms to
/// quiesce before the bus is opened.
pub async fn unbind_bmx055() -> Result<()> {
    unbind_all(Path::new(SYSFS_I2C_DRIVERS))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

fn unbind_all(sysfs_root: &Path) -> Result<()> {
    for (driver, device) in BINDINGS {
        unbind_one(sysfs_root, driver, device)?;
    }
    Ok(())
}

fn unbind_one(sysfs_root: &Path, driver: &str, device: &str) -> Result<()> {
    let path = sysfs_root.join(driver).join("unbind");

    let mut file = match std::fs::OpenOptions::new().write(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(driver, "no kernel driver bound, nothing to unbind");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    file.write_all(device.as_bytes())?;
    info!(driver, device, "unbound kernel driver");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_root(name: &str) -> std::path::PathBuf {
        let root = std::env::temp_dir().join(format!("unbind-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn missing_driver_dirs_are_tolerated() {
        let root = scratch_root("missing");
        unbind_all(&root).unwrap();
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn writes_device_id_into_unbind_file() {
        let root = scratch_root("write");
        let driver_dir = root.join("bmg160_i2c");
        fs::create_dir_all(&driver_dir).unwrap();
        fs::write(driver_dir.join("unbind"), "").unwrap();

        unbind_all(&root).unwrap();

        let written = fs::read_to_string(driver_dir.join("unbind")).unwrap();
        assert_eq!(written, "3-0068");
        fs::remove_dir_all(&root).unwrap();
    }
}

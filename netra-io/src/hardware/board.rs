//! Board health readings

use crate::error::Result;
use std::fs;
use std::path::Path;

const CPU_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const GPU_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone1/temp";

/// CPU temperature in °C
pub fn cpu_temperature() -> Result<f32> {
    read_thermal_zone(Path::new(CPU_THERMAL_ZONE))
}

/// GPU temperature in °C, `None` on boards without a second zone
pub fn gpu_temperature() -> Option<f32> {
    read_thermal_zone(Path::new(GPU_THERMAL_ZONE)).ok()
}

/// Thermal zones report millidegrees
pub fn read_thermal_zone(path: &Path) -> Result<f32> {
    let raw = fs::read_to_string(path)?;
    let millidegrees: i64 = raw.trim().parse().map_err(|e| {
        crate::error::Error::InvalidParameter(format!(
            "bad thermal reading {:?} in {}: {}",
            raw.trim(),
            path.display(),
            e
        ))
    })?;
    Ok(millidegrees as f32 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millidegrees_to_celsius() {
        let dir = tempfile::tempdir().unwrap();
        let zone = dir.path().join("temp");
        fs::write(&zone, "48312\n").unwrap();
        assert!((read_thermal_zone(&zone).unwrap() - 48.312).abs() < 1e-3);

        fs::write(&zone, "n/a").unwrap();
        assert!(read_thermal_zone(&zone).is_err());
    }
}

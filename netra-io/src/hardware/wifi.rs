//! Join a wireless network through NetworkManager

use std::process::Command;

/// Why `connect_wifi` failed
#[derive(Debug, thiserror::Error)]
pub enum WifiError {
    #[error("scanning too frequently, retry later")]
    ScanTooFrequent,

    #[error("no network with SSID {0:?} found")]
    SsidNotFound(String),

    #[error("nmcli exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("could not run nmcli: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Connect to `ssid`, optionally forcing a rescan first
pub fn connect_wifi(ssid: &str, password: &str, rescan: bool) -> Result<(), WifiError> {
    if rescan {
        run_nmcli(&["device", "wifi", "rescan"], ssid)?;
    }
    run_nmcli(&["device", "wifi", "connect", ssid, "password", password], ssid)?;
    log::info!("Connected to Wi-Fi network {:?}", ssid);
    Ok(())
}

fn run_nmcli(args: &[&str], ssid: &str) -> Result<(), WifiError> {
    let output = Command::new("nmcli").args(args).output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(classify_exit(
        output.status.code(),
        String::from_utf8_lossy(&output.stderr).trim(),
        ssid,
    ))
}

/// nmcli exit codes: 1 unknown/rate limited, 10 object not found
fn classify_exit(code: Option<i32>, stderr: &str, ssid: &str) -> WifiError {
    match code {
        Some(1) => WifiError::ScanTooFrequent,
        Some(10) => WifiError::SsidNotFound(ssid.to_string()),
        code => WifiError::Failed {
            code,
            stderr: stderr.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert!(matches!(classify_exit(Some(1), "", "lab"), WifiError::ScanTooFrequent));
        assert!(matches!(
            classify_exit(Some(10), "", "lab"),
            WifiError::SsidNotFound(s) if s == "lab"
        ));
        assert!(matches!(
            classify_exit(Some(4), "activation failed", "lab"),
            WifiError::Failed { code: Some(4), .. }
        ));
    }
}

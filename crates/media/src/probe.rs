use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use crate::{MediaConfig, MediaError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub async fn probe_duration_secs(config: &MediaConfig, path: &Path) -> Result<f64, MediaError> {
    let mut cmd = Command::new(&config.ffprobe_bin);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::BinaryMissing { tool: config.ffprobe_bin.clone() }
        } else {
            MediaError::Io(e)
        }
    })?;

    let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout {
            tool: config.ffprobe_bin.clone(),
            secs: PROBE_TIMEOUT.as_secs(),
        })??;

    let unavailable = || MediaError::DurationUnavailable {
        path: path.display().to_string(),
    };

    if !output.status.success() {
        return Err(unavailable());
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout).map_err(|_| unavailable())?;
    parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .ok_or_else(unavailable)
}

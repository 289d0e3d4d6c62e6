use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// wget exits with 8 when the server answered some request with an error.
/// The top-level page may still have been saved, so that is not fatal.
const WGET_SERVER_ERROR: i32 = 8;

/// Fetches the top-level page with an external `wget` run, leaving the raw
/// HTML in the output directory.
pub struct WgetMirror {
    wget_path: PathBuf,
    user_agent: String,
    wait_secs: u64,
}

impl WgetMirror {
    pub fn locate(user_agent: &str, wait_secs: u64) -> Result<Self> {
        let wget_path = which::which("wget")
            .map_err(|e| anyhow!("wget is required for the mirroring step but was not found on PATH: {}", e))?;

        Ok(Self::with_binary(wget_path, user_agent, wait_secs))
    }

    pub fn with_binary(wget_path: PathBuf, user_agent: &str, wait_secs: u64) -> Self {
        Self {
            wget_path,
            user_agent: user_agent.to_string(),
            wait_secs,
        }
    }

    pub fn arguments(&self, url: &str, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            format!("--wait={}", self.wait_secs),
            format!("--user-agent={}", self.user_agent),
            "--no-parent".to_string(),
            "--convert-links".to_string(),
            "--adjust-extension".to_string(),
            "--no-clobber".to_string(),
            "-e".to_string(),
            "robots=off".to_string(),
            "--accept=html,htm".to_string(),
            "--no-directories".to_string(),
            "--level=1".to_string(),
            "-P".to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(output_dir.as_os_str().to_os_string());
        args.push(OsString::from(url));
        args
    }

    /// Runs wget and returns the expected `index.html` path. A non-zero exit
    /// status is only logged; the caller checks whether the page arrived.
    pub async fn mirror_page(&self, url: &str, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

        info!("Running {:?} for {}", self.wget_path, url);
        let status = Command::new(&self.wget_path)
            .args(self.arguments(url, output_dir))
            .status()
            .await
            .context("Failed to run wget")?;

        match status.code() {
            Some(0) => info!("wget finished"),
            Some(WGET_SERVER_ERROR) => warn!("wget finished with server errors; continuing"),
            _ => warn!("wget exited with {}", status),
        }

        Ok(output_dir.join("index.html"))
    }
}

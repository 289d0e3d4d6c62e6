use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::category::AssetCategory;

pub const NO_MISSING_RESOURCES: &str = "No missing resources.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub category: AssetCategory,
    pub url: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(category: AssetCategory, url: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            category,
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Resource fetches that failed during one run. Append-only; owned by the run
/// rather than shared globally.
#[derive(Debug, Default, Clone)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Report text: a single success line, or one numbered
    /// `[category] url → reason` line per failure.
    pub fn render(&self) -> String {
        if self.records.is_empty() {
            return format!("{}\n", NO_MISSING_RESOURCES);
        }

        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                format!("{}. [{}] {} → {}\n", i + 1, record.category, record.url, record.reason)
            })
            .collect()
    }

    /// Writes the report to `<log_dir>/<hostname>.log` and returns its path.
    pub fn write_report(&self, log_dir: &Path, site_url: &str) -> Result<PathBuf> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

        let report_path = log_dir.join(format!("{}.log", report_name(site_url)));
        fs::write(&report_path, self.render())
            .with_context(|| format!("Failed to write report: {:?}", report_path))?;

        Ok(report_path)
    }
}

impl Extend<FailureRecord> for FailureLedger {
    fn extend<T: IntoIterator<Item = FailureRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}

/// Host name of `site_url`, or a filesystem-safe rendering of the raw string
/// when it does not parse.
pub fn report_name(site_url: &str) -> String {
    if let Some(host) = Url::parse(site_url.trim()).ok().and_then(|u| u.host_str().map(str::to_string)) {
        return host;
    }

    let sanitized: String = site_url
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "site".to_string()
    } else {
        sanitized
    }
}

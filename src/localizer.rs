use anyhow::{Context, Result};
use encoding_rs::Encoding;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::css_scanner::{build_origin_map, CssPostScanner};
use crate::downloader::Fetch;
use crate::failures::FailureLedger;
use crate::file_manager::FileManager;
use crate::html_parser::{encode_html, HtmlDocument};
use crate::inline::extract_inline_resources;
use crate::normalizer::normalize_document;
use crate::rewriter::{collect_references, localize_references, LocalAsset};

#[derive(Debug, Clone)]
pub struct LocalizeOptions {
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub show_progress: bool,
}

impl LocalizeOptions {
    /// Options with the report folder placed next to `output_dir` as `log/`.
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            log_dir: default_log_dir(output_dir),
            show_progress: false,
        }
    }
}

pub fn default_log_dir(output_dir: &Path) -> PathBuf {
    match output_dir.parent() {
        Some(parent) => parent.join("log"),
        None => PathBuf::from("log"),
    }
}

/// Result of localizing one HTML document.
#[derive(Debug)]
pub struct LocalizedPage {
    pub html: String,
    /// Charset the page declared; `html` is written back in it.
    pub encoding: &'static Encoding,
    pub assets: Vec<LocalAsset>,
    pub failures: FailureLedger,
}

impl LocalizedPage {
    pub fn encoded_html(&self) -> Vec<u8> {
        encode_html(&self.html, self.encoding)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub index_path: PathBuf,
    pub report_path: PathBuf,
    pub assets: usize,
    pub failures: usize,
}

/// Turns one downloaded page into a self-contained bundle below the output
/// directory.
pub struct PageLocalizer<F: Fetch> {
    site_url: String,
    base_url: Option<Url>,
    fetcher: F,
    file_manager: FileManager,
    options: LocalizeOptions,
}

impl<F: Fetch> PageLocalizer<F> {
    pub fn new(site_url: &str, fetcher: F, options: LocalizeOptions) -> Result<Self> {
        let file_manager = FileManager::new(&options.output_dir)?;
        let base_url = match Url::parse(site_url.trim()) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Page URL {:?} does not parse ({}); relative references stay untouched", site_url, e);
                None
            }
        };

        Ok(Self {
            site_url: site_url.to_string(),
            base_url,
            fetcher,
            file_manager,
            options,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    /// Localizes `index.html` in the output directory in place and writes the
    /// failure report. Returns `None` when there is no `index.html` to work on.
    /// The page is saved before the stylesheet pass starts.
    pub async fn run(&self) -> Result<Option<RunSummary>> {
        let index_path = self.file_manager.index_path();
        if !index_path.is_file() {
            warn!("No index.html found at {:?}; skipping localization", index_path);
            return Ok(None);
        }

        let content = fs::read(&index_path)
            .with_context(|| format!("Failed to read {:?}", index_path))?;
        let document = HtmlDocument::parse_bytes(&content)?;

        let mut page = self.rewrite_document(document).await?;
        fs::write(&index_path, page.encoded_html())
            .with_context(|| format!("Failed to write {:?}", index_path))?;

        self.scan_stylesheets(&mut page).await?;
        let report_path = page
            .failures
            .write_report(&self.options.log_dir, &self.site_url)?;

        Ok(Some(RunSummary {
            index_path,
            report_path,
            assets: page.assets.len(),
            failures: page.failures.len(),
        }))
    }

    /// Rewrites `html_content` so every inline and remote resource it uses
    /// lives in the output tree. Individual fetch failures are collected in the
    /// returned ledger; only filesystem and parse errors abort.
    pub async fn localize(&self, html_content: &str) -> Result<LocalizedPage> {
        let document = HtmlDocument::parse(html_content)?;
        let mut page = self.rewrite_document(document).await?;
        self.scan_stylesheets(&mut page).await?;
        Ok(page)
    }

    /// Everything up to and including serialization.
    async fn rewrite_document(&self, mut document: HtmlDocument) -> Result<LocalizedPage> {
        let mut failures = FailureLedger::new();

        let inline = extract_inline_resources(&mut document, &self.file_manager)?;
        info!("Extracted {} inline styles and {} inline scripts", inline.styles, inline.scripts);

        let references = collect_references(&document, self.base_url.as_ref());
        let progress = self.progress_bar();
        let rewrite = localize_references(&references, &self.fetcher, &self.file_manager, &progress).await?;
        progress.finish_and_clear();
        failures.extend(rewrite.failures);

        normalize_document(&mut document);

        Ok(LocalizedPage {
            html: document.serialize()?,
            encoding: document.encoding(),
            assets: rewrite.assets,
            failures,
        })
    }

    async fn scan_stylesheets(&self, page: &mut LocalizedPage) -> Result<()> {
        let origins = build_origin_map(&page.assets);
        let css_scan = CssPostScanner::new(
            &self.fetcher,
            &self.file_manager,
            self.base_url.as_ref(),
            &origins,
        )?
        .scan()
        .await?;
        info!(
            "Rewrote {} of {} stylesheets, {} nested assets localized",
            css_scan.files_rewritten,
            css_scan.files_scanned,
            css_scan.assets.len()
        );

        page.failures.extend(css_scan.failures);
        page.assets.extend(css_scan.assets);
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let progress_bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            progress_bar.set_style(style.progress_chars("=> "));
        }
        progress_bar.set_message("Downloading resources");
        progress_bar
    }
}

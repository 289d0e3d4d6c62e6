#![allow(dead_code)]

use page_localizer::{Fetch, FetchError, LocalizeOptions, PageLocalizer};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// In-memory stand-in for the HTTP client. Unknown URLs answer `HTTP 404`.
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Fetch for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.calls.borrow_mut().push(url.to_string());
        // Let the other in-flight fetches make progress, like real network I/O.
        tokio::task::yield_now().await;

        match self.responses.get(url.as_str()) {
            Some(body) => Ok(body.clone()),
            None => Err(FetchError::Status(404)),
        }
    }
}

pub fn localizer(site_url: &str, output_dir: &Path, fetcher: FakeFetcher) -> PageLocalizer<FakeFetcher> {
    PageLocalizer::new(site_url, fetcher, LocalizeOptions::new(output_dir)).unwrap()
}

/// Sorted file names directly inside `dir` (empty when it does not exist).
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub fn output_dir(root: &Path) -> PathBuf {
    root.join("dist")
}

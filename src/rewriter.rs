use anyhow::Result;
use futures::future::join_all;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use markup5ever_rcdom::Handle;
use std::path::PathBuf;
use url::Url;

use crate::category::AssetCategory;
use crate::downloader::{is_absolute_reference, parse_remote_url, Fetch};
use crate::failures::FailureRecord;
use crate::file_manager::FileManager;
use crate::html_parser::{get_node_attr, set_node_attr, HtmlDocument};

const MEDIA_TAGS: &[&str] = &["img", "source", "video"];

/// A file written to the output tree for one remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub category: AssetCategory,
    pub path: PathBuf,
    pub source_url: Url,
}

impl LocalAsset {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An element attribute that points at a remote resource.
#[derive(Clone)]
pub struct ResourceReference {
    pub node: Handle,
    pub attr_name: &'static str,
    pub url: Url,
    pub category: AssetCategory,
}

#[derive(Debug, Default)]
pub struct RewriteOutcome {
    pub assets: Vec<LocalAsset>,
    pub failures: Vec<FailureRecord>,
}

/// Finds absolute stylesheet links, absolute script sources and media `src`
/// attributes. Media references may also be root-relative or protocol-relative;
/// those are resolved against `base_url` first.
pub fn collect_references(document: &HtmlDocument, base_url: Option<&Url>) -> Vec<ResourceReference> {
    let mut references = Vec::new();

    for link in document.find_elements("link") {
        let is_stylesheet = get_node_attr(&link, "rel")
            .map(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
            .unwrap_or(false);
        if !is_stylesheet {
            continue;
        }
        if let Some(url) = get_node_attr(&link, "href").as_deref().and_then(absolute_url) {
            references.push(ResourceReference {
                node: link.clone(),
                attr_name: "href",
                url,
                category: AssetCategory::Css,
            });
        }
    }

    for script in document.find_elements("script") {
        if let Some(url) = get_node_attr(&script, "src").as_deref().and_then(absolute_url) {
            references.push(ResourceReference {
                node: script.clone(),
                attr_name: "src",
                url,
                category: AssetCategory::Js,
            });
        }
    }

    for tag_name in MEDIA_TAGS {
        for element in document.find_elements(tag_name) {
            let Some(src) = get_node_attr(&element, "src") else {
                continue;
            };
            if let Some(url) = resolve_media_url(&src, base_url) {
                references.push(ResourceReference {
                    node: element.clone(),
                    category: AssetCategory::from_url(&url),
                    attr_name: "src",
                    url,
                });
            }
        }
    }

    references
}

fn absolute_url(value: &str) -> Option<Url> {
    if !is_absolute_reference(value) {
        return None;
    }
    let url = parse_remote_url(value);
    if url.is_none() {
        debug!("Skipping unparsable reference {:?}", value);
    }
    url
}

fn resolve_media_url(src: &str, base_url: Option<&Url>) -> Option<Url> {
    let src = src.trim();
    if src.starts_with('/') && !src.starts_with("//") {
        let resolved = base_url?.join(src).ok()?;
        return match resolved.scheme() {
            "http" | "https" => Some(resolved),
            _ => None,
        };
    }
    absolute_url(src)
}

/// Fetches every reference concurrently and waits until all of them have
/// settled. Successful fetches are written under a unique name and their
/// attribute is pointed at the local copy; failures keep the original value.
pub async fn localize_references<F: Fetch>(
    references: &[ResourceReference],
    fetcher: &F,
    file_manager: &FileManager,
    progress: &ProgressBar,
) -> Result<RewriteOutcome> {
    info!("Localizing {} remote references", references.len());
    progress.set_length(references.len() as u64);

    let operations = references.iter().map(|reference| async move {
        let outcome = localize_one(fetcher, file_manager, &reference.url, reference.category).await;
        progress.inc(1);
        outcome
    });
    let settled = join_all(operations).await;

    let mut outcome = RewriteOutcome::default();
    for (reference, result) in references.iter().zip(settled) {
        match result? {
            Ok(asset) => {
                let local_path = file_manager.get_relative_path(&asset.path)?;
                set_node_attr(&reference.node, reference.attr_name, &local_path);
                outcome.assets.push(asset);
            }
            Err(failure) => outcome.failures.push(failure),
        }
    }

    Ok(outcome)
}

async fn localize_one<F: Fetch>(
    fetcher: &F,
    file_manager: &FileManager,
    url: &Url,
    category: AssetCategory,
) -> Result<Result<LocalAsset, FailureRecord>> {
    let content = match fetcher.fetch(url).await {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to download {} {}: {}", category, url, e);
            return Ok(Err(FailureRecord::new(category, url.as_str(), e)));
        }
    };

    let path = file_manager.save_asset(category, url, &content)?;
    debug!("Saved {} to {:?}", url, path);

    Ok(Ok(LocalAsset {
        category,
        path,
        source_url: url.clone(),
    }))
}

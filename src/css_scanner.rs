use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::bytes::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::category::AssetCategory;
use crate::downloader::{normalize_protocol_relative, Fetch};
use crate::failures::FailureRecord;
use crate::file_manager::{to_url_path, FileManager};
use crate::rewriter::LocalAsset;

const URL_TOKEN_PATTERN: &str =
    r#"(?i)url\(\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^)"'\s]+))\s*\)"#;

/// Local CSS file name → remote URL the file was downloaded from.
pub type CssOriginMap = HashMap<String, Url>;

/// Origin map for the stylesheets among `assets`.
pub fn build_origin_map(assets: &[LocalAsset]) -> CssOriginMap {
    assets
        .iter()
        .filter(|asset| asset.category == AssetCategory::Css)
        .map(|asset| (asset.file_name(), asset.source_url.clone()))
        .collect()
}

#[derive(Debug, Default)]
pub struct CssScanSummary {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub assets: Vec<LocalAsset>,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
    None,
}

impl Quote {
    fn wrap(self, value: &str) -> String {
        match self {
            Quote::Double => format!("url(\"{}\")", value),
            Quote::Single => format!("url('{}')", value),
            Quote::None => format!("url({})", value),
        }
    }
}

struct UrlToken {
    start: usize,
    end: usize,
    raw: String,
    quote: Quote,
}

/// Second pass over the stylesheets in `css/`: pulls in every `url(...)`
/// target that still points off-site and rewrites the token to
/// `../asset/<category>/<name>`. Files and tokens are handled one at a time.
pub struct CssPostScanner<'a, F: Fetch> {
    fetcher: &'a F,
    file_manager: &'a FileManager,
    base_url: Option<&'a Url>,
    origins: &'a CssOriginMap,
    url_token: Regex,
    localized: HashMap<Url, PathBuf>,
    summary: CssScanSummary,
}

impl<'a, F: Fetch> CssPostScanner<'a, F> {
    pub fn new(
        fetcher: &'a F,
        file_manager: &'a FileManager,
        base_url: Option<&'a Url>,
        origins: &'a CssOriginMap,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            file_manager,
            base_url,
            origins,
            url_token: Regex::new(URL_TOKEN_PATTERN)?,
            localized: HashMap::new(),
            summary: CssScanSummary::default(),
        })
    }

    pub async fn scan(mut self) -> Result<CssScanSummary> {
        let css_dir = self.file_manager.css_dir();
        let mut css_files: Vec<PathBuf> = fs::read_dir(&css_dir)
            .with_context(|| format!("Failed to read directory: {:?}", css_dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("css"))
                        .unwrap_or(false)
            })
            .collect();
        css_files.sort();

        info!("Scanning {} stylesheets for url() references", css_files.len());
        for css_file in css_files {
            self.scan_file(&css_file).await?;
        }

        Ok(self.summary)
    }

    async fn scan_file(&mut self, css_file: &Path) -> Result<()> {
        let css = fs::read(css_file)
            .with_context(|| format!("Failed to read stylesheet: {:?}", css_file))?;
        self.summary.files_scanned += 1;

        let file_name = css_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let css_origin = self.origins.get(&file_name).cloned();
        let css_dir = css_file.parent().unwrap_or(Path::new(".")).to_path_buf();

        let tokens = self.find_tokens(&css);
        // Spliced as bytes: anything outside a rewritten token is copied
        // through untouched, whatever the stylesheet's charset.
        let mut rewritten: Vec<u8> = Vec::with_capacity(css.len());
        let mut last = 0usize;
        let mut changed = false;

        for token in tokens {
            rewritten.extend_from_slice(&css[last..token.start]);
            last = token.end;

            match self.localize_token(&token.raw, css_origin.as_ref(), &css_dir).await? {
                Some(local_path) => {
                    rewritten.extend_from_slice(token.quote.wrap(&local_path).as_bytes());
                    changed = true;
                }
                None => rewritten.extend_from_slice(&css[token.start..token.end]),
            }
        }
        rewritten.extend_from_slice(&css[last..]);

        if changed {
            fs::write(css_file, rewritten)
                .with_context(|| format!("Failed to write stylesheet: {:?}", css_file))?;
            self.summary.files_rewritten += 1;
        }

        Ok(())
    }

    /// `url(...)` tokens whose value is valid UTF-8; others are never rewritten.
    fn find_tokens(&self, css: &[u8]) -> Vec<UrlToken> {
        self.url_token
            .captures_iter(css)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let (value, quote) = if let Some(m) = caps.name("dq") {
                    (m, Quote::Double)
                } else if let Some(m) = caps.name("sq") {
                    (m, Quote::Single)
                } else {
                    (caps.name("bare")?, Quote::None)
                };
                let raw = std::str::from_utf8(value.as_bytes()).ok()?;

                Some(UrlToken {
                    start: whole.start(),
                    end: whole.end(),
                    raw: raw.trim().to_string(),
                    quote,
                })
            })
            .collect()
    }

    /// New token value (relative to `css_dir`) for `raw`, or `None` to leave
    /// the token as it is.
    async fn localize_token(
        &mut self,
        raw: &str,
        css_origin: Option<&Url>,
        css_dir: &Path,
    ) -> Result<Option<String>> {
        if is_local_asset_reference(raw, css_dir) {
            return Ok(None);
        }

        let Some(url) = resolve_css_reference(raw, css_origin, self.base_url) else {
            return Ok(None);
        };

        if let Some(asset_path) = self.localized.get(&url) {
            return Ok(Some(relative_to(asset_path, css_dir)));
        }

        let category = AssetCategory::from_url(&url);
        let content = match self.fetcher.fetch(&url).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to download {} {}: {}", category, url, e);
                self.summary
                    .failures
                    .push(FailureRecord::new(category, url.as_str(), e));
                return Ok(None);
            }
        };

        let asset_path = self.file_manager.save_asset(category, &url, &content)?;
        debug!("Saved {} to {:?}", url, asset_path);

        let local_path = relative_to(&asset_path, css_dir);
        self.localized.insert(url.clone(), asset_path.clone());
        self.summary.assets.push(LocalAsset {
            category,
            path: asset_path,
            source_url: url,
        });

        Ok(Some(local_path))
    }
}

/// A token written by an earlier run: `../asset/...` pointing at a file that exists.
fn is_local_asset_reference(raw: &str, css_dir: &Path) -> bool {
    raw.starts_with("../asset/") && css_dir.join(raw).is_file()
}

/// Absolute URL for a `url(...)` value. Relative values resolve against the
/// stylesheet's own remote origin when known, else against the page URL.
/// `data:` URIs, fragments and unparsable values give `None`.
pub fn resolve_css_reference(raw: &str, css_origin: Option<&Url>, base_url: Option<&Url>) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    let resolved = if raw.starts_with("//") || lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(&normalize_protocol_relative(raw))
    } else {
        css_origin.or(base_url)?.join(raw)
    };

    match resolved {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping unresolvable css reference {:?}: {}", raw, e);
            None
        }
    }
}

fn relative_to(path: &Path, dir: &Path) -> String {
    match pathdiff::diff_paths(path, dir) {
        Some(relative) => to_url_path(&relative),
        None => to_url_path(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_relative_reference_uses_stylesheet_origin() {
        let origin = url("https://cdn.example.com/v2/site.css");
        let page = url("https://www.example.com/blog/post.html");

        assert_eq!(
            resolve_css_reference("../img/logo.png", Some(&origin), Some(&page)),
            Some(url("https://cdn.example.com/img/logo.png"))
        );
        assert_eq!(
            resolve_css_reference("../img/logo.png", None, Some(&page)),
            Some(url("https://www.example.com/img/logo.png"))
        );
    }

    #[test]
    fn test_absolute_and_skipped_references() {
        let page = url("https://www.example.com/");

        assert_eq!(
            resolve_css_reference("//fonts.example.com/a.woff2", None, Some(&page)),
            Some(url("https://fonts.example.com/a.woff2"))
        );
        assert_eq!(
            resolve_css_reference("http://other.example.com/x.gif", None, Some(&page)),
            Some(url("http://other.example.com/x.gif"))
        );
        assert_eq!(resolve_css_reference("data:image/png;base64,AAAA", None, Some(&page)), None);
        assert_eq!(resolve_css_reference("DATA:image/svg+xml,<svg/>", None, Some(&page)), None);
        assert_eq!(resolve_css_reference("#clip", None, Some(&page)), None);
        assert_eq!(resolve_css_reference("img/x.png", None, None), None);
    }

    #[test]
    fn test_token_pattern_handles_quotes_and_whitespace() {
        let regex = Regex::new(URL_TOKEN_PATTERN).unwrap();
        let css = r#"a{background:url( "a.png" )} b{src:url('b.woff')} c{x:URL(c.gif)}"#;

        let values: Vec<&[u8]> = regex
            .captures_iter(css.as_bytes())
            .map(|caps| {
                caps.name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"))
                    .unwrap()
                    .as_bytes()
            })
            .collect();
        assert_eq!(values, vec![&b"a.png"[..], &b"b.woff"[..], &b"c.gif"[..]]);
    }

    #[test]
    fn test_quote_style_is_preserved() {
        assert_eq!(Quote::Double.wrap("../asset/img/a.png"), r#"url("../asset/img/a.png")"#);
        assert_eq!(Quote::Single.wrap("../asset/img/a.png"), "url('../asset/img/a.png')");
        assert_eq!(Quote::None.wrap("../asset/img/a.png"), "url(../asset/img/a.png)");
    }

    #[test]
    fn test_relative_to_css_dir() {
        let css_dir = Path::new("/out/css");
        assert_eq!(relative_to(Path::new("/out/asset/font/a.woff2"), css_dir), "../asset/font/a.woff2");
    }
}
